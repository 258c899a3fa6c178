//! Wrapped Talleo (WTLO) token contract ABI
//!
//! Uses alloy's sol! macro to generate type-safe bindings for the events the
//! ingestor decodes and the call the writer encodes.

use alloy::sol;

sol! {
    /// WTLO token with built-in conversion hooks
    contract WrappedTalleo {
        /// Emitted when a holder burns WTLO to receive TLO
        ///
        /// * `from` - Ethereum account that burned the tokens
        /// * `to` - Raw Talleo address bytes of the recipient
        /// * `value` - Amount in TLO minor units (2 decimals)
        event ConversionTo(address indexed from, bytes to, uint256 value);

        /// Mint WTLO for a TLO deposit (owner only)
        ///
        /// * `from` - Raw Talleo address bytes the deposit was sent to
        /// * `to` - Ethereum recipient decoded from the payment id
        /// * `value` - Amount in TLO minor units
        function convertFrom(bytes calldata from, address to, uint256 value) external returns (bool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{keccak256, Address, Bytes, U256};
    use alloy::sol_types::{SolCall, SolEvent};

    #[test]
    fn test_conversion_to_signature() {
        assert_eq!(
            WrappedTalleo::ConversionTo::SIGNATURE_HASH,
            keccak256(b"ConversionTo(address,bytes,uint256)")
        );
    }

    #[test]
    fn test_convert_from_encoding() {
        let call = WrappedTalleo::convertFromCall {
            from: Bytes::from(vec![1u8, 2, 3]),
            to: Address::repeat_byte(0x11),
            value: U256::from(500u64),
        };
        let data = call.abi_encode();
        assert_eq!(&data[..4], &keccak256(b"convertFrom(bytes,address,uint256)")[..4]);

        let decoded = WrappedTalleo::convertFromCall::abi_decode(&data, true).unwrap();
        assert_eq!(decoded.value, U256::from(500u64));
        assert_eq!(decoded.to, Address::repeat_byte(0x11));
    }
}
