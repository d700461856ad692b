//! Centralized Contract Definitions
//!
//! All Solidity interfaces consumed by the engine, defined with alloy's
//! `sol!` macro. Each interface is annotated with `#[sol(rpc)]` so a
//! contract instance can make RPC calls through any alloy Provider.
//! The call structs double as calldata encoders for the batch RPC path
//! (`SolCall::abi_encode` / `abi_decode_returns`).

use alloy::sol;

// ── ERC20 ─────────────────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
    }
}

// ── Uniswap V2 style factory / pair / router ─────────────────────────

sol! {
    #[sol(rpc)]
    interface IUniswapV2Factory {
        function getPair(address tokenA, address tokenB) external view returns (address pair);
        function allPairs(uint256 index) external view returns (address pair);
        function allPairsLength() external view returns (uint256);
    }
}

sol! {
    #[sol(rpc)]
    interface IUniswapV2Pair {
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        function token0() external view returns (address);
        function token1() external view returns (address);
    }
}

sol! {
    #[sol(rpc)]
    interface IUniswapV2Router02 {
        function factory() external view returns (address);
        function getAmountsOut(uint256 amountIn, address[] calldata path) external view returns (uint256[] memory amounts);
    }
}

// ── ArbExecutor (deployed multi-hop flash-loan executor) ─────────────

sol! {
    #[sol(rpc)]
    interface IArbExecutor {
        struct SwapAction {
            address router;
            address[] path;
            uint256 amountIn;
            uint256 minOut;
        }

        struct ArbPlan {
            address loanToken;
            uint256 loanAmount;
            SwapAction[] steps;
            uint256 minProfit;
            address beneficiary;
        }

        function executeArb(ArbPlan calldata plan) external;
    }
}
