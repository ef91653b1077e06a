/// Scenario tests for the account service core logic.
///
/// Everything here runs against in-memory fakes: the store, clock, and
/// federated verifier are all injected, so no database or network is
/// needed.
pub mod fixtures;
