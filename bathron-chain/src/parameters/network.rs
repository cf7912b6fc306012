use std::fmt;

use serde::{Deserialize, Serialize};

/// An enum describing the possible network choices.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Network {
    /// The production network.
    Mainnet,
    /// The public test network.
    Testnet,
    /// Private testing.
    Regtest,
}

impl Network {
    /// True iff `byte` is an accepted burn-mark network byte for this
    /// network.
    ///
    /// Two spellings are accepted per network for historical reasons:
    /// mainnet takes `0x00` or `'M'`, the test networks take `0x01` or
    /// `'T'`.
    pub fn accepts_burn_network_byte(self, byte: u8) -> bool {
        match self {
            Network::Mainnet => byte == 0x00 || byte == b'M',
            Network::Testnet | Network::Regtest => byte == 0x01 || byte == b'T',
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Testnet => f.write_str("testnet"),
            Network::Regtest => f.write_str("regtest"),
        }
    }
}
