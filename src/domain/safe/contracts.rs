//! ABI bindings of the Safe contracts the relay talks to.
use alloy::sol;

sol! {
    /// Safe master copy, v1.0.0 and later.
    interface IGnosisSafe {
        function setup(
            address[] calldata _owners,
            uint256 _threshold,
            address to,
            bytes calldata data,
            address fallbackHandler,
            address paymentToken,
            uint256 payment,
            address paymentReceiver
        ) external;

        function execTransaction(
            address to,
            uint256 value,
            bytes calldata data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            bytes calldata signatures
        ) external returns (bool success);

        function requiredTxGas(
            address to,
            uint256 value,
            bytes calldata data,
            uint8 operation
        ) external returns (uint256);

        function getThreshold() external view returns (uint256);
        function getOwners() external view returns (address[] memory);
        function nonce() external view returns (uint256);
        function VERSION() external view returns (string memory);
    }
}

sol! {
    /// Safe master copy before v1.0.0, deployed by the legacy paying proxy.
    interface IGnosisSafeV0 {
        function setup(
            address[] calldata _owners,
            uint256 _threshold,
            address to,
            bytes calldata data
        ) external;
    }
}

sol! {
    interface IProxyFactory {
        function createProxyWithNonce(
            address _mastercopy,
            bytes memory initializer,
            uint256 saltNonce
        ) external returns (address proxy);

        function proxyCreationCode() external pure returns (bytes memory);
        function proxyRuntimeCode() external pure returns (bytes memory);
    }
}
