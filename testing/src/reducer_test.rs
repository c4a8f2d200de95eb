//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.
//! A rejected action is also checked against the reducer contract: the state must come back
//! exactly as it was given.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use hemolink_core::{DomainError, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for event assertion functions
type EventAssertion<V> = Box<dyn FnOnce(&[V])>;

/// Type alias for error assertion functions
type ErrorAssertion = Box<dyn FnOnce(&DomainError)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use hemolink_testing::ReducerTest;
///
/// ReducerTest::new(RequestReducer)
///     .with_env(test_environment())
///     .given_state(pending_request())
///     .when_action(RequestAction::Accept { donor })
///     .then_state(|request| assert_eq!(request.status, RequestStatus::Accepted))
///     .then_events(|events| assert_eq!(events.len(), 1))
///     .run();
/// ```
pub struct ReducerTest<R>
where
    R: Reducer,
{
    reducer: R,
    environment: Option<R::Environment>,
    initial_state: Option<R::State>,
    action: Option<R::Action>,
    state_assertions: Vec<StateAssertion<R::State>>,
    event_assertions: Vec<EventAssertion<R::Event>>,
    error_assertion: Option<ErrorAssertion>,
}

impl<R> ReducerTest<R>
where
    R: Reducer,
    R::State: Clone + PartialEq + std::fmt::Debug,
    R::Event: std::fmt::Debug,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            action: None,
            state_assertions: Vec::new(),
            event_assertions: Vec::new(),
            error_assertion: None,
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: R::Environment) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: R::Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the emitted events (Then)
    #[must_use]
    pub fn then_events<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[R::Event]) + 'static,
    {
        self.event_assertions.push(Box::new(assertion));
        self
    }

    /// Expect the action to be rejected (Then)
    #[must_use]
    pub fn then_error<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&DomainError) + 'static,
    {
        self.error_assertion = Some(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// if the outcome (accepted or rejected) differs from what was expected,
    /// if a rejected action touched the state, or if any assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        let before = state.clone();
        let outcome = self.reducer.reduce(&mut state, action, &env);

        match (outcome, self.error_assertion) {
            (Ok(events), None) => {
                for assertion in self.event_assertions {
                    assertion(&events[..]);
                }
            }
            (Ok(events), Some(_)) => {
                panic!("Expected the action to be rejected, but it emitted {events:?}");
            }
            (Err(error), None) => {
                panic!("Expected the action to succeed, but it failed: {error}");
            }
            (Err(error), Some(assertion)) => {
                assert_eq!(state, before, "Rejected action must leave the state untouched");
                assertion(&error);
            }
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hemolink_core::{Operation, SmallVec, smallvec};

    #[derive(Clone, Debug, PartialEq)]
    struct Stock {
        units: u32,
    }

    #[derive(Clone, Debug)]
    enum StockAction {
        Add(u32),
        Take(u32),
    }

    struct StockReducer;

    impl Reducer for StockReducer {
        type State = Stock;
        type Action = StockAction;
        type Environment = ();
        type Event = i64;

        fn reduce(
            &self,
            state: &mut Stock,
            action: StockAction,
            _env: &(),
        ) -> Result<SmallVec<[i64; 4]>, DomainError> {
            match action {
                StockAction::Add(n) => {
                    state.units += n;
                    Ok(smallvec![i64::from(n)])
                }
                StockAction::Take(n) if n > state.units => Err(DomainError::InvalidTransition {
                    current: "short",
                    attempted: Operation::Complete,
                }),
                StockAction::Take(n) => {
                    state.units -= n;
                    Ok(smallvec![-i64::from(n)])
                }
            }
        }
    }

    #[test]
    fn accepted_action_checks_state_and_events() {
        ReducerTest::new(StockReducer)
            .with_env(())
            .given_state(Stock { units: 1 })
            .when_action(StockAction::Add(2))
            .then_state(|state| assert_eq!(state.units, 3))
            .then_events(|events| assert_eq!(events, &[2]))
            .run();
    }

    #[test]
    fn rejected_action_checks_error() {
        ReducerTest::new(StockReducer)
            .with_env(())
            .given_state(Stock { units: 1 })
            .when_action(StockAction::Take(5))
            .then_error(|error| {
                assert!(matches!(error, DomainError::InvalidTransition { .. }));
            })
            .then_state(|state| assert_eq!(state.units, 1))
            .run();
    }

    #[test]
    #[should_panic(expected = "Expected the action to succeed")]
    fn unexpected_rejection_panics() {
        ReducerTest::new(StockReducer)
            .with_env(())
            .given_state(Stock { units: 0 })
            .when_action(StockAction::Take(1))
            .run();
    }
}
