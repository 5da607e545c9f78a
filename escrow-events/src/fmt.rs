// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use ethers::types::{Address, H256, U256};

// Display for H160/H256 truncates with an ellipsis; persisted and served
// values always use the full lowercase 0x form.

pub fn hex_address(address: &Address) -> String {
    format!("{:#x}", address)
}

pub fn hex_hash(hash: &H256) -> String {
    format!("{:#x}", hash)
}

pub fn decimal(value: &U256) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_width_lowercase_hex() {
        let address: Address =
            "0xABCDEF0123456789abcdef0123456789ABCDEF01".parse().unwrap();
        assert_eq!(
            hex_address(&address),
            "0xabcdef0123456789abcdef0123456789abcdef01"
        );
        assert_eq!(hex_hash(&H256::zero()).len(), 66);
    }

    #[test]
    fn amounts_are_decimal_strings() {
        let amount = U256::from_dec_str("340282366920938463463374607431768211456")
            .unwrap();
        assert_eq!(
            decimal(&amount),
            "340282366920938463463374607431768211456"
        );
    }
}
