/// Common shape for the engine's state machines (default monitoring,
/// governance proposals).
pub trait LifecycleState: Send + Sync + Clone + std::fmt::Debug {
    /// Check if this is a terminal state
    fn is_terminal(&self) -> bool;

    /// Check if transition to another state is valid
    fn can_transition_to(&self, next: &Self) -> bool;
}
