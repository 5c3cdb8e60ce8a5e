//! The four-part OT state of a session
//!
//! Notation follows the EasySync model:
//!
//! | slot | meaning |
//! |------|---------|
//! | A    | `server_text` at `server_rev`, the last revision both sides agree on |
//! | X    | `sent`: submitted to the server, not yet acknowledged |
//! | Y    | `pending`: local changes not yet submitted |
//! | V    | `client_text`, what the user sees |
//!
//! After every transition `V == Y(X(A))`. [`OtState`] has no I/O; the session
//! feeds it local edits and server messages and does the talking.

use crate::changeset::{ApplyError, Changeset};
use crate::error::{PadError, Result};
use crate::Revision;
use tracing::debug;

/// A commit ready to be sent as `USER_CHANGES`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub base_rev: Revision,
    pub changeset: Changeset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtState {
    server_text: String,
    server_rev: Revision,
    sent: Changeset,
    pending: Changeset,
    client_text: String,
    client_rev: Option<Revision>,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl OtState {
    /// Fully synced state at `rev`
    pub fn new(text: String, rev: Revision) -> Self {
        let len = char_len(&text);
        Self {
            client_text: text.clone(),
            server_text: text,
            server_rev: rev,
            sent: Changeset::identity(len),
            pending: Changeset::identity(len),
            client_rev: Some(rev),
        }
    }

    pub fn server_text(&self) -> &str {
        &self.server_text
    }

    pub fn server_rev(&self) -> Revision {
        self.server_rev
    }

    pub fn client_text(&self) -> &str {
        &self.client_text
    }

    /// Revision the client text corresponds to; `None` while local changes
    /// are unacknowledged
    pub fn client_rev(&self) -> Option<Revision> {
        self.client_rev
    }

    pub fn sent(&self) -> &Changeset {
        &self.sent
    }

    pub fn pending(&self) -> &Changeset {
        &self.pending
    }

    /// Length of the client text in characters
    pub fn client_len(&self) -> usize {
        self.pending.new_len()
    }

    pub fn is_awaiting_ack(&self) -> bool {
        !self.sent.is_identity()
    }

    pub fn is_send_pending(&self) -> bool {
        !self.pending.is_identity()
    }

    fn refresh_client_rev(&mut self) {
        self.client_rev = if self.sent.is_identity() && self.pending.is_identity() {
            Some(self.server_rev)
        } else {
            None
        };
    }

    /// Absorbs a local edit made on top of the client text
    ///
    /// # Errors
    ///
    /// `PadError::Apply` if `cs` does not start from the client text length.
    /// Nothing changes on error.
    pub fn apply_local(&mut self, cs: &Changeset) -> Result<()> {
        let pending = self.pending.compose(cs)?;
        let client_text = cs.apply_to_text(&self.client_text)?;

        self.pending = pending;
        self.client_text = client_text;
        self.refresh_client_rev();
        Ok(())
    }

    /// Moves pending changes in flight, if nothing else is
    pub fn take_commit(&mut self) -> Option<Submission> {
        if self.is_awaiting_ack() || !self.is_send_pending() {
            return None;
        }

        let len = self.pending.new_len();
        let changeset = std::mem::replace(&mut self.pending, Changeset::identity(len));
        self.sent = changeset.clone();

        Some(Submission {
            base_rev: self.server_rev,
            changeset,
        })
    }

    fn expect_next_rev(&self, what: &str, new_rev: Revision) -> Result<()> {
        if self.server_rev.checked_add(1) != Some(new_rev) {
            return Err(PadError::Protocol(format!(
                "{} for revision {} while at revision {}",
                what, new_rev, self.server_rev
            )));
        }
        Ok(())
    }

    /// Rebases local state over a remote edit `b` committed as `new_rev`
    ///
    /// Returns the changeset that turns the old client text into the new one;
    /// it is the identity when the remote edit is invisible locally.
    ///
    /// # Errors
    ///
    /// `PadError::Protocol` on a revision gap, `PadError::Apply` if `b` does
    /// not fit the server text, `PadError::Consistency` if the result breaks
    /// coherence. Nothing changes on the first two.
    pub fn apply_remote(&mut self, b: &Changeset, new_rev: Revision) -> Result<Changeset> {
        self.expect_next_rev("NEW_CHANGES", new_rev)?;
        let server_text = b.apply_to_text(&self.server_text)?;

        // X' = f(B, X), f(X, B)
        let (sent, fxb) = if self.sent.is_identity() {
            (Changeset::identity(b.new_len()), b.clone())
        } else {
            (b.follow(&self.sent, false)?, self.sent.follow(b, true)?)
        };

        // Y' = f(f(X, B), Y), D = f(Y, f(X, B))
        let pending = fxb.follow(&self.pending, true)?;
        let d = self.pending.follow(&fxb, false)?;
        let client_text = if d.is_identity() {
            self.client_text.clone()
        } else {
            d.apply_to_text(&self.client_text)?
        };

        self.server_text = server_text;
        self.server_rev = new_rev;
        self.sent = sent;
        self.pending = pending;
        self.client_text = client_text;
        self.refresh_client_rev();

        debug!(
            rev = new_rev,
            visible = !d.is_identity(),
            awaiting_ack = self.is_awaiting_ack(),
            "applied remote changes"
        );

        self.check_coherence()?;
        Ok(d)
    }

    /// Our in-flight changes were committed as `new_rev`
    ///
    /// # Errors
    ///
    /// `PadError::Protocol` if nothing is in flight or on a revision gap.
    pub fn apply_accept(&mut self, new_rev: Revision) -> Result<()> {
        if !self.is_awaiting_ack() {
            return Err(PadError::Protocol(format!(
                "ACCEPT_COMMIT for revision {} with nothing in flight",
                new_rev
            )));
        }
        self.expect_next_rev("ACCEPT_COMMIT", new_rev)?;

        let server_text = self.sent.apply_to_text(&self.server_text)?;
        let len = self.sent.new_len();

        self.server_text = server_text;
        self.server_rev = new_rev;
        self.sent = Changeset::identity(len);
        self.refresh_client_rev();

        debug!(rev = new_rev, "commit accepted");
        self.check_coherence()
    }

    /// Folds in-flight changes back into pending
    ///
    /// Used when the connection drops: the server may or may not have seen
    /// the submission, and the only way back is a fresh `CLIENT_VARS`.
    pub fn requeue_in_flight(&mut self) -> Result<()> {
        if !self.is_awaiting_ack() {
            return Ok(());
        }
        let pending = self.sent.compose(&self.pending)?;
        self.sent = Changeset::identity(self.sent.old_len());
        self.pending = pending;
        self.check_coherence()
    }

    /// Checks `client_text == pending(sent(server_text))`
    pub fn check_coherence(&self) -> Result<()> {
        let expected = self
            .sent
            .apply_to_text(&self.server_text)
            .and_then(|t| self.pending.apply_to_text(&t))
            .map_err(|e: ApplyError| PadError::Consistency {
                expected: e.to_string(),
                client_text: self.client_text.clone(),
            })?;

        if expected != self.client_text {
            return Err(PadError::Consistency {
                expected,
                client_text: self.client_text.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(text: &str, pos: usize, removed: usize, ins: &str) -> Changeset {
        Changeset::simple_edit(text, pos, removed, ins).unwrap()
    }

    #[test]
    fn test_local_edit_then_accept() {
        let mut st = OtState::new("\n".to_string(), 0);

        st.apply_local(&edit("\n", 0, 0, "hi\n")).unwrap();
        assert_eq!(st.client_text(), "hi\n\n");
        assert_eq!(st.pending().to_string(), "Z:1>3+3$hi\n");
        assert_eq!(st.client_rev(), None);

        let sub = st.take_commit().unwrap();
        assert_eq!(sub.base_rev, 0);
        assert!(st.is_awaiting_ack());
        assert!(!st.is_send_pending());

        st.apply_accept(1).unwrap();
        assert_eq!(st.server_text(), "hi\n\n");
        assert_eq!(st.server_rev(), 1);
        assert!(st.sent().is_identity());
        assert_eq!(st.client_rev(), Some(1));
    }

    #[test]
    fn test_at_most_one_in_flight() {
        let mut st = OtState::new("ab\n".to_string(), 0);
        st.apply_local(&edit("ab\n", 0, 0, "1")).unwrap();
        assert!(st.take_commit().is_some());

        st.apply_local(&edit("1ab\n", 0, 0, "2")).unwrap();
        assert!(st.take_commit().is_none());
        assert!(st.is_send_pending());

        st.apply_accept(1).unwrap();
        let sub = st.take_commit().unwrap();
        assert_eq!(sub.base_rev, 1);
        assert_eq!(sub.changeset.apply_to_text("1ab\n").unwrap(), "21ab\n");
    }

    #[test]
    fn test_remote_edit_while_synced() {
        let mut st = OtState::new("hello\n".to_string(), 3);
        let d = st.apply_remote(&edit("hello\n", 0, 1, "J"), 4).unwrap();

        assert_eq!(d, edit("hello\n", 0, 1, "J"));
        assert_eq!(st.client_text(), "Jello\n");
        assert_eq!(st.client_rev(), Some(4));
    }

    #[test]
    fn test_remote_insert_tied_with_pending() {
        let mut st = OtState::new("ab".to_string(), 0);
        st.apply_local(&edit("ab", 1, 0, "X")).unwrap();

        // Unsent local text stays in front of the remote insert
        st.apply_remote(&edit("ab", 1, 0, "Y"), 1).unwrap();
        assert_eq!(st.server_text(), "aYb");
        assert_eq!(st.client_text(), "aXYb");
        assert_eq!(st.pending().apply_to_text("aYb").unwrap(), "aXYb");
        assert_eq!(st.client_rev(), None);
    }

    #[test]
    fn test_remote_insert_tied_with_in_flight() {
        let mut st = OtState::new("ab".to_string(), 0);
        st.apply_local(&edit("ab", 1, 0, "X")).unwrap();
        st.take_commit().unwrap();

        // The server already ordered the remote insert first
        st.apply_remote(&edit("ab", 1, 0, "Y"), 1).unwrap();
        assert_eq!(st.server_text(), "aYb");
        assert_eq!(st.client_text(), "aYXb");
        assert_eq!(st.sent().apply_to_text("aYb").unwrap(), "aYXb");

        st.apply_accept(2).unwrap();
        assert_eq!(st.server_text(), "aYXb");
        assert_eq!(st.client_rev(), Some(2));
    }

    #[test]
    fn test_remote_with_in_flight_and_pending() {
        let base = "one two three\n";
        let mut st = OtState::new(base.to_string(), 0);
        st.apply_local(&edit(base, 0, 3, "1")).unwrap();
        st.take_commit().unwrap();
        st.apply_local(&edit("1 two three\n", 6, 5, "3")).unwrap();
        assert_eq!(st.client_text(), "1 two 3\n");

        // Someone rewrites the middle word
        st.apply_remote(&edit(base, 4, 3, "TWO"), 1).unwrap();
        assert_eq!(st.server_text(), "one TWO three\n");
        assert_eq!(st.client_text(), "1 TWO 3\n");

        st.apply_accept(2).unwrap();
        assert_eq!(st.server_text(), "1 TWO three\n");
        assert_eq!(st.client_rev(), None);
    }

    #[test]
    fn test_revision_gap_is_protocol_error() {
        let mut st = OtState::new("ab".to_string(), 5);
        let before = st.clone();

        let err = st
            .apply_remote(&edit("ab", 0, 0, "x"), 7)
            .unwrap_err();
        assert!(matches!(err, PadError::Protocol(_)));
        assert!(err.is_fatal());
        assert_eq!(st, before);
    }

    #[test]
    fn test_revision_after_max_is_protocol_error() {
        let mut st = OtState::new("ab".to_string(), Revision::MAX);
        let before = st.clone();

        let err = st.apply_remote(&edit("ab", 0, 0, "x"), 0).unwrap_err();
        assert!(matches!(err, PadError::Protocol(_)));
        assert_eq!(st, before);

        st.apply_local(&edit("ab", 0, 0, "y")).unwrap();
        st.take_commit().unwrap();
        assert!(matches!(st.apply_accept(0), Err(PadError::Protocol(_))));
    }

    #[test]
    fn test_accept_without_in_flight() {
        let mut st = OtState::new("ab".to_string(), 0);
        assert!(matches!(st.apply_accept(1), Err(PadError::Protocol(_))));
    }

    #[test]
    fn test_remote_length_mismatch_leaves_state() {
        let mut st = OtState::new("ab".to_string(), 0);
        let before = st.clone();
        let err = st
            .apply_remote(&Changeset::identity(9), 1)
            .unwrap_err();
        assert!(matches!(err, PadError::Apply(_)));
        assert_eq!(st, before);
    }

    #[test]
    fn test_local_length_mismatch_leaves_state() {
        let mut st = OtState::new("ab".to_string(), 0);
        let before = st.clone();
        assert!(st.apply_local(&Changeset::identity(5)).is_err());
        assert_eq!(st, before);
    }

    #[test]
    fn test_requeue_in_flight() {
        let mut st = OtState::new("ab\n".to_string(), 2);
        st.apply_local(&edit("ab\n", 2, 0, "c")).unwrap();
        st.take_commit().unwrap();
        st.apply_local(&edit("abc\n", 3, 0, "d")).unwrap();

        st.requeue_in_flight().unwrap();
        assert!(!st.is_awaiting_ack());
        assert_eq!(
            st.pending().apply_to_text("ab\n").unwrap(),
            "abcd\n"
        );
        assert_eq!(st.client_text(), "abcd\n");
    }
}
