// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use ethers::contract::abigen;

// View functions only. State mutations always go through user wallets; the
// server never signs escrow transactions.
abigen!(
    ClawedEscrow,
    r#"[
        function usdc() external view returns (address)
        function treasury() external view returns (address)
        function arbiter() external view returns (address)
        function depositFeeAmount() external view returns (uint256)
        function recipientFeeAmount() external view returns (uint256)
    ]"#
);
