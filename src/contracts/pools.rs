use ethers::prelude::*;

abigen!(
    IERC20,
    r#"[
        function decimals() external view returns (uint8)
        function balanceOf(address account) external view returns (uint256)
        function totalSupply() external view returns (uint256)
    ]"#
);

abigen!(
    UniswapV2Pair,
    r#"[
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast)
        function token0() external view returns (address)
        function token1() external view returns (address)
    ]"#
);

abigen!(
    UniswapV3Pool,
    r#"[
        function token0() external view returns (address)
        function token1() external view returns (address)
        function fee() external view returns (uint24)
    ]"#
);

abigen!(
    CurvePool,
    r#"[
        function coins(uint256 i) external view returns (address)
        function balances(uint256 i) external view returns (uint256)
        function get_virtual_price() external view returns (uint256)
    ]"#
);

abigen!(
    AavePool,
    r#"[
        struct ReserveConfigurationMap { uint256 data; }
        struct ReserveData { ReserveConfigurationMap configuration; uint128 liquidityIndex; uint128 currentLiquidityRate; uint128 variableBorrowIndex; uint128 currentVariableBorrowRate; uint128 currentStableBorrowRate; uint40 lastUpdateTimestamp; uint16 id; address aTokenAddress; address stableDebtTokenAddress; address variableDebtTokenAddress; address interestRateStrategyAddress; uint128 accruedToTreasury; uint128 unbacked; uint128 isolationModeTotalDebt; }
        function getReserveData(address asset) external view returns (ReserveData)
    ]"#
);
