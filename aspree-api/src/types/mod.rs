/// Identifier newtypes: row ids, document numbers, access tokens.
pub mod ids;
/// Monetary helpers over [`rust_decimal::Decimal`].
pub mod money;
/// Phone normalization for the Indonesian numbering plan.
pub mod phone;
/// Status sum types and their transition tables.
pub mod status;
