//! Consensus errors and the stable reject-reason contract.
//!
//! The reject-reason strings returned by `reject_reason()` are parsed by
//! monitoring and dashboards: changing one is a coordinated upgrade, never a
//! refactor. Variants not covered by the published list carry
//! validation-internal strings.
//!
//! Error policy by kind:
//! - malformed input: reject the transaction or block, never mutate state;
//! - consensus failure: reject, peer is misbehaving, state untouched
//!   (mutations happen only after all checks pass);
//! - local resource failure and internal inconsistency
//!   ([`BlockError::Fatal`]): halt the node, never skip;
//! - benign races (finality gossip for unknown blocks) are not errors and
//!   are dropped at the aggregation layer.

use thiserror::Error;

/// Numeric reject code for invalid data.
pub const REJECT_INVALID: u8 = 0x10;

/// Numeric reject code for duplicates.
pub const REJECT_DUPLICATE: u8 = 0x12;

/// A settlement or containment rule violation by one transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("bad-txlock-type: transaction type is not TX_LOCK")]
    LockWrongType,

    #[error("bad-txlock-output-count: TX_LOCK needs a vault output and a receipt output")]
    LockOutputCount,

    #[error("bad-txlock-amount-zero: vault amount must be positive")]
    LockAmountZero,

    #[error("bad-txlock-amount-mismatch: receipt amount must equal vault amount")]
    LockAmountMismatch,

    #[error("bad-txlock-vault-not-optrue: vault output script must be OP_TRUE")]
    LockVaultNotOpTrue,

    #[error("bad-txlock-input-not-m0: TX_LOCK may only spend plain M0")]
    LockInputNotM0,

    #[error("bad-txlock-same-block-receipt: TX_LOCK may not spend a receipt created in this block")]
    LockSameBlockReceipt,

    #[error("bad-txunlock-type: transaction type is not TX_UNLOCK")]
    UnlockWrongType,

    #[error("bad-txunlock-no-receipts: TX_UNLOCK needs at least one M1 receipt input")]
    UnlockNoReceipts,

    #[error("bad-txunlock-fee-before-vault: canonical input order is receipts, vaults, then fees")]
    UnlockFeeBeforeVault,

    #[error("bad-txunlock-m0-exceeds-vault: released M0 exceeds the vault inputs")]
    UnlockM0ExceedsVault,

    #[error("bad-txunlock-conservation-violated: unlock does not conserve M1 against M0")]
    UnlockConservation,

    #[error("bad-txunlock-vault-change-not-optrue: vault change must use the OP_TRUE script")]
    UnlockVaultChangeNotOpTrue,

    #[error("bad-txtransfer-no-receipt-input: TX_TRANSFER_M1 needs an M1 receipt input")]
    TransferNoReceiptInput,

    #[error("bad-txtransfer-receipt-not-vin0: the receipt must be spent at vin[0]")]
    TransferReceiptNotVin0,

    #[error("bad-txtransfer-invalid-outputs: M1 outputs must be positive and spendable")]
    TransferInvalidOutputs,

    #[error("bad-txtransfer-m1-not-conserved: M1 outputs must sum exactly to the M1 input")]
    TransferNotConserved,

    #[error("bad-txns-optrue-forbidden: only settlement transactions may touch OP_TRUE outputs")]
    OpTrueForbidden,

    #[error("bad-txns-receipt-forbidden: only settlement transactions may spend receipts")]
    ReceiptForbidden,

    #[error("bad-txns-amount-overflow: amount accumulation overflowed")]
    AmountOverflow,

    #[error("bad-txns-inputs-missing: referenced outputs were not found")]
    InputsMissing,
}

impl TransactionError {
    /// The stable reject-reason string for this failure.
    pub fn reject_reason(&self) -> &'static str {
        use TransactionError::*;
        match self {
            LockWrongType => "bad-txlock-type",
            LockOutputCount => "bad-txlock-output-count",
            LockAmountZero => "bad-txlock-amount-zero",
            LockAmountMismatch => "bad-txlock-amount-mismatch",
            LockVaultNotOpTrue => "bad-txlock-vault-not-optrue",
            LockInputNotM0 => "bad-txlock-input-not-m0",
            LockSameBlockReceipt => "bad-txlock-same-block-receipt",
            UnlockWrongType => "bad-txunlock-type",
            UnlockNoReceipts => "bad-txunlock-no-receipts",
            UnlockFeeBeforeVault => "bad-txunlock-fee-before-vault",
            UnlockM0ExceedsVault => "bad-txunlock-m0-exceeds-vault",
            UnlockConservation => "bad-txunlock-conservation-violated",
            UnlockVaultChangeNotOpTrue => "bad-txunlock-vault-change-not-optrue",
            TransferNoReceiptInput => "bad-txtransfer-no-receipt-input",
            TransferReceiptNotVin0 => "bad-txtransfer-receipt-not-vin0",
            TransferInvalidOutputs => "bad-txtransfer-invalid-outputs",
            TransferNotConserved => "bad-txtransfer-m1-not-conserved",
            OpTrueForbidden => "bad-txns-optrue-forbidden",
            ReceiptForbidden => "bad-txns-receipt-forbidden",
            AmountOverflow => "bad-txns-amount-overflow",
            InputsMissing => "bad-txns-inputs-missing",
        }
    }

    pub fn reject_code(&self) -> u8 {
        REJECT_INVALID
    }
}

/// A burn claim validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BurnClaimError {
    #[error("btc-burns-disabled-emergency: the burn kill switch is tripped")]
    Disabled,

    #[error("burn-claim-parse-failed: payload or embedded BTC transaction is malformed")]
    ParseFailed,

    #[error("burn-claim-duplicate: this BTC txid is already claimed")]
    Duplicate,

    #[error("burn-claim-unknown-block: BTC block not found in the header store")]
    UnknownBlock,

    #[error("burn-claim-block-not-best: BTC block is not on the best chain")]
    BlockNotBest,

    #[error("burn-claim-height-mismatch: claimed BTC height does not match the header store")]
    HeightMismatch,

    /// This string is monitored; keep it stable.
    #[error("burn-claim-spv-range: BTC block is below the supported SPV range")]
    SpvRange,

    #[error("burn-claim-merkle-invalid: inclusion proof does not verify")]
    MerkleInvalid,

    #[error("burn-claim-format-invalid: the BTC transaction is not a well-formed burn")]
    FormatInvalid,

    #[error("burn-claim-network-mismatch: burn mark targets another network")]
    NetworkMismatch,
}

impl BurnClaimError {
    pub fn reject_reason(&self) -> &'static str {
        use BurnClaimError::*;
        match self {
            Disabled => "btc-burns-disabled-emergency",
            ParseFailed => "burn-claim-parse-failed",
            Duplicate => "burn-claim-duplicate",
            UnknownBlock => "burn-claim-unknown-block",
            BlockNotBest => "burn-claim-block-not-best",
            HeightMismatch => "burn-claim-height-mismatch",
            SpvRange => "burn-claim-spv-range",
            MerkleInvalid => "burn-claim-merkle-invalid",
            FormatInvalid => "burn-claim-format-invalid",
            NetworkMismatch => "burn-claim-network-mismatch",
        }
    }

    pub fn reject_code(&self) -> u8 {
        match self {
            BurnClaimError::Duplicate => REJECT_DUPLICATE,
            _ => REJECT_INVALID,
        }
    }
}

/// A mint validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MintError {
    #[error("mint-not-special: transaction type is not TX_MINT_M0BTC")]
    NotSpecial,

    #[error("mint-no-payload: mint carries no payload")]
    NoPayload,

    #[error("mint-payload-decode: payload does not decode")]
    PayloadDecode,

    #[error("mint-payload-invalid: payload is structurally invalid")]
    PayloadInvalid,

    #[error("mint-has-inputs: mint transactions have an empty input set")]
    HasInputs,

    #[error("mint-output-count: one output per finalized claim")]
    OutputCount,

    #[error("mint-not-sorted: claim txids must be strictly sorted")]
    NotSorted,

    #[error("mint-unknown-claim: no claim record for this txid")]
    UnknownClaim,

    #[error("mint-not-pending: claim is not PENDING")]
    NotPending,

    #[error("mint-claim-too-early: the finality delay has not elapsed")]
    ClaimTooEarly,

    #[error("mint-btc-invalid: the claim no longer verifies against the BTC chain")]
    BtcInvalid,

    #[error("mint-amount-range: burned amount outside the money range")]
    AmountRange,

    #[error("mint-amount-dust: burned amount below the dust floor")]
    AmountDust,

    #[error("mint-dest-mismatch: output script does not pay the claim destination")]
    DestMismatch,

    #[error("mint-amount-mismatch: output value does not equal the burned amount")]
    AmountMismatch,

    #[error("btc-burns-disabled-emergency: the burn kill switch is tripped")]
    Disabled,
}

impl MintError {
    pub fn reject_reason(&self) -> &'static str {
        use MintError::*;
        match self {
            NotSpecial => "mint-not-special",
            NoPayload => "mint-no-payload",
            PayloadDecode => "mint-payload-decode",
            PayloadInvalid => "mint-payload-invalid",
            HasInputs => "mint-has-inputs",
            OutputCount => "mint-output-count",
            NotSorted => "mint-not-sorted",
            UnknownClaim => "mint-unknown-claim",
            NotPending => "mint-not-pending",
            ClaimTooEarly => "mint-claim-too-early",
            BtcInvalid => "mint-btc-invalid",
            AmountRange => "mint-amount-range",
            AmountDust => "mint-amount-dust",
            DestMismatch => "mint-dest-mismatch",
            AmountMismatch => "mint-amount-mismatch",
            Disabled => "btc-burns-disabled-emergency",
        }
    }

    pub fn reject_code(&self) -> u8 {
        REJECT_INVALID
    }
}

/// A block-level validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("block has no transactions")]
    NoTransactions,

    #[error("bad-blk-coinbase: the first transaction must be the only coinbase")]
    CoinbasePosition,

    #[error("bad-blk-coinbase: coinbase input found outside the first transaction")]
    CoinbaseInputFound,

    #[error("bad-blk-merkle-root: merkle root does not commit to the transactions")]
    BadMerkleRoot,

    #[error("bad-blk-duplicate-tx: duplicate transaction in block")]
    DuplicateTransaction,

    #[error("bad-blk-height: coinbase height missing or out of sequence")]
    BadHeight,

    #[error("bad-blk-burn-claims: too many burn claims in one block")]
    TooManyBurnClaims,

    #[error("bad-blk-multiple-mints: at most one mint transaction per block")]
    MultipleMints,

    #[error("bad-blk-time-slot: block time is not on a producer slot boundary")]
    TimeNotSlotAligned,

    #[error("bad-blk-time-mtp: block time does not exceed the median time past")]
    TimeTooEarly,

    #[error("bad-blk-time-future: block time is too far in the future")]
    TimeTooFar,

    #[error("bad-blk-producer: producer is not entitled to this slot")]
    WrongProducer,

    #[error("bad-blk-sig: producer signature does not verify")]
    BadProducerSignature,

    #[error("bad-btcheaders-payload: TX_BTC_HEADERS payload is malformed")]
    BadHeadersPayload,

    #[error("bad-btcheaders-sig: TX_BTC_HEADERS signature does not verify")]
    BadHeadersSignature,

    /// The explicit genesis bootstrap guard: block 1 headers must agree
    /// with the local SPV view.
    #[error("btcheaders-spv-mismatch: published headers disagree with the local SPV chain")]
    HeadersSpvMismatch,

    #[error("finality-reorg-forbidden: reorganization would unwind a finalized block")]
    FinalizedReorg,

    /// The A6 consensus invariant broke after apply or undo. State is
    /// inconsistent; the node must halt.
    #[error("settlement-a6-broken: M0_vaulted != M1_supply after block application")]
    A6Broken,

    #[error("{0}")]
    Transaction(#[from] TransactionError),

    #[error("{0}")]
    BurnClaim(#[from] BurnClaimError),

    #[error("{0}")]
    Mint(#[from] MintError),

    /// Unrecoverable local failure: DB corruption, undo targets missing,
    /// supply underflow. The caller must shut the node down.
    #[error("fatal consensus inconsistency: {0}")]
    Fatal(String),
}

impl BlockError {
    /// The stable reject-reason string for this failure.
    pub fn reject_reason(&self) -> &'static str {
        use BlockError::*;
        match self {
            NoTransactions | CoinbasePosition | CoinbaseInputFound => "bad-blk-coinbase",
            BadMerkleRoot => "bad-blk-merkle-root",
            DuplicateTransaction => "bad-blk-duplicate-tx",
            BadHeight => "bad-blk-height",
            TooManyBurnClaims => "bad-blk-burn-claims",
            MultipleMints => "bad-blk-multiple-mints",
            TimeNotSlotAligned => "bad-blk-time-slot",
            TimeTooEarly => "bad-blk-time-mtp",
            TimeTooFar => "bad-blk-time-future",
            WrongProducer => "bad-blk-producer",
            BadProducerSignature => "bad-blk-sig",
            BadHeadersPayload => "bad-btcheaders-payload",
            BadHeadersSignature => "bad-btcheaders-sig",
            HeadersSpvMismatch => "btcheaders-spv-mismatch",
            FinalizedReorg => "finality-reorg-forbidden",
            A6Broken => "settlement-a6-broken",
            Transaction(inner) => inner.reject_reason(),
            BurnClaim(inner) => inner.reject_reason(),
            Mint(inner) => inner.reject_reason(),
            Fatal(_) => "fatal-internal",
        }
    }

    pub fn reject_code(&self) -> u8 {
        match self {
            BlockError::BurnClaim(inner) => inner.reject_code(),
            _ => REJECT_INVALID,
        }
    }

    /// Fatal errors must halt the node instead of rejecting the block.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BlockError::Fatal(_) | BlockError::A6Broken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The published reject strings are an external contract; lock them.
    #[test]
    fn stable_reject_strings() {
        assert_eq!(
            TransactionError::LockVaultNotOpTrue.reject_reason(),
            "bad-txlock-vault-not-optrue"
        );
        assert_eq!(
            TransactionError::UnlockConservation.reject_reason(),
            "bad-txunlock-conservation-violated"
        );
        assert_eq!(
            TransactionError::TransferNotConserved.reject_reason(),
            "bad-txtransfer-m1-not-conserved"
        );
        assert_eq!(
            TransactionError::OpTrueForbidden.reject_reason(),
            "bad-txns-optrue-forbidden"
        );
        assert_eq!(BurnClaimError::SpvRange.reject_reason(), "burn-claim-spv-range");
        assert_eq!(
            BurnClaimError::Disabled.reject_reason(),
            "btc-burns-disabled-emergency"
        );
        assert_eq!(MintError::NotSorted.reject_reason(), "mint-not-sorted");
        assert_eq!(BlockError::A6Broken.reject_reason(), "settlement-a6-broken");
    }

    #[test]
    fn duplicate_claims_use_the_duplicate_code() {
        assert_eq!(BurnClaimError::Duplicate.reject_code(), REJECT_DUPLICATE);
        assert_eq!(BurnClaimError::MerkleInvalid.reject_code(), REJECT_INVALID);
    }

    #[test]
    fn a6_is_fatal() {
        assert!(BlockError::A6Broken.is_fatal());
        assert!(BlockError::Fatal("db".into()).is_fatal());
        assert!(!BlockError::BadMerkleRoot.is_fatal());
    }
}
