//! Typed IDs for type-safe entity references.
//!
//! Using typed IDs prevents accidentally passing a `BranchId` where an `OrganizationId`
//! is expected, which matters in a multi-tenant ledger where every row carries both.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to generate typed ID wrappers.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random ID using UUID v7 (time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

typed_id!(UserId, "Unique identifier for a user (teller, cashier, loan officer).");
typed_id!(OrganizationId, "Unique identifier for an organization.");
typed_id!(BranchId, "Unique identifier for a branch of an organization.");
typed_id!(AccountId, "Unique identifier for a ledger account.");
typed_id!(MemberProfileId, "Unique identifier for a member profile.");
typed_id!(
    MemberJointAccountId,
    "Unique identifier for a joint account holder attached to a member."
);
typed_id!(
    TransactionId,
    "Unique identifier for a teller transaction grouping ledger entries."
);
typed_id!(LedgerEntryId, "Unique identifier for a ledger entry.");
typed_id!(TransactionBatchId, "Unique identifier for a teller's transaction batch.");
typed_id!(CashCountId, "Unique identifier for a cash count line.");
typed_id!(
    DisbursementTransactionId,
    "Unique identifier for a disbursement line of a batch."
);
typed_id!(LoanTransactionId, "Unique identifier for a loan transaction header.");
typed_id!(
    LoanTransactionEntryId,
    "Unique identifier for a loan transaction entry."
);
typed_id!(PaymentTypeId, "Unique identifier for a payment type.");
typed_id!(MediaId, "Unique identifier for a stored attachment.");
