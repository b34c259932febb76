//! Login state transitions over a caller-owned session.

use crate::errors::ConceptError;

/// The only state a session carries: who is logged in, if anyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sessioning;

impl Sessioning {
    pub fn start(&self, session: &mut SessionState, user: &str) -> Result<(), ConceptError> {
        self.is_logged_out(session)?;
        session.user = Some(user.to_string());
        Ok(())
    }

    pub fn end(&self, session: &mut SessionState) -> Result<(), ConceptError> {
        self.is_logged_in(session)?;
        session.user = None;
        Ok(())
    }

    pub fn get_user(&self, session: &SessionState) -> Result<String, ConceptError> {
        session.user.clone().ok_or_else(must_be_logged_in)
    }

    pub fn is_logged_in(&self, session: &SessionState) -> Result<(), ConceptError> {
        match session.user {
            Some(_) => Ok(()),
            None => Err(must_be_logged_in()),
        }
    }

    pub fn is_logged_out(&self, session: &SessionState) -> Result<(), ConceptError> {
        match session.user {
            Some(_) => Err(ConceptError::not_allowed("Must be logged out!")),
            None => Ok(()),
        }
    }
}

fn must_be_logged_in() -> ConceptError {
    ConceptError::unauthenticated("Must be logged in!")
}
