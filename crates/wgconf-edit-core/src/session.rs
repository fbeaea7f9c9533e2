use std::cell::{Cell, RefCell};

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use tracing::{debug, warn};

use crate::annotate::{scan_document_with, ScanResult};
use crate::error::EditResult;
use crate::splice::Splice;

/// A document owned by the caller that the session may edit in place.
pub trait TextBuffer {
    fn text(&self) -> &str;

    fn apply(&mut self, splice: &Splice) -> EditResult<()>;
}

impl TextBuffer for String {
    fn text(&self) -> &str {
        self
    }

    fn apply(&mut self, splice: &Splice) -> EditResult<()> {
        *self = splice.apply(self)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
}

/// Result of asking a session to scan. Requests made while a scan is already
/// running are `Skipped`; the running call re-scans after its own edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome<T = ScanResult> {
    Completed(T),
    Skipped,
}

impl<T> ScanOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            ScanOutcome::Completed(value) => Some(value),
            ScanOutcome::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ScanOutcome::Skipped)
    }
}

/// Outcome of [`ScanSession::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refreshed {
    /// Scan of the buffer as it stands after any autofill.
    pub result: ScanResult,
    /// Splice written into the buffer, when a private key was generated.
    pub autofill: Option<Splice>,
}

impl Refreshed {
    pub fn changed(&self) -> bool {
        self.autofill.is_some()
    }
}

/// Single-owner driver for scans of one document.
///
/// Not `Sync`; a session belongs to the one caller that edits the buffer.
#[derive(Debug)]
pub struct ScanSession<R = OsRng> {
    state: Cell<ScanState>,
    rng: RefCell<R>,
}

impl ScanSession<OsRng> {
    pub fn new() -> Self {
        Self::with_rng(OsRng)
    }
}

impl Default for ScanSession<OsRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RngCore + CryptoRng> ScanSession<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            state: Cell::new(ScanState::Idle),
            rng: RefCell::new(rng),
        }
    }

    pub fn state(&self) -> ScanState {
        self.state.get()
    }

    /// Scans `text` without touching it.
    pub fn scan(&self, text: &str) -> ScanOutcome {
        let Some(_guard) = self.enter() else {
            warn!("scan requested while another scan is running; skipping");
            return ScanOutcome::Skipped;
        };
        ScanOutcome::Completed(self.scan_now(text))
    }

    /// Scans the buffer, writes any generated private key into it and scans
    /// once more so the returned spans describe the edited text.
    pub fn refresh<B: TextBuffer + ?Sized>(
        &self,
        buffer: &mut B,
    ) -> EditResult<ScanOutcome<Refreshed>> {
        let Some(_guard) = self.enter() else {
            warn!("refresh requested while another scan is running; skipping");
            return Ok(ScanOutcome::Skipped);
        };

        let first = self.scan_now(buffer.text());
        let Some(splice) = first.autofill().cloned() else {
            return Ok(ScanOutcome::Completed(Refreshed {
                result: first,
                autofill: None,
            }));
        };

        buffer.apply(&splice)?;
        debug!(offset = splice.range_start, "applied private key autofill");

        let result = self.scan_now(buffer.text());
        Ok(ScanOutcome::Completed(Refreshed {
            result,
            autofill: Some(splice),
        }))
    }

    fn scan_now(&self, text: &str) -> ScanResult {
        let mut rng = self.rng.borrow_mut();
        scan_document_with(text, &mut *rng)
    }

    fn enter(&self) -> Option<ScanGuard<'_>> {
        match self.state.replace(ScanState::Scanning) {
            ScanState::Idle => Some(ScanGuard { state: &self.state }),
            ScanState::Scanning => None,
        }
    }
}

// Returns the session to `Idle` however the scan ends.
struct ScanGuard<'a> {
    state: &'a Cell<ScanState>,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.state.set(ScanState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::decode_key;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::rc::Rc;

    fn seeded() -> ScanSession<StdRng> {
        ScanSession::with_rng(StdRng::seed_from_u64(42))
    }

    #[test]
    fn refresh_fills_an_empty_private_key_once() {
        let session = seeded();
        let mut text = String::from("[Interface]\nPrivateKey =\nAddress = 10.0.0.2/32\n");

        let refreshed = session.refresh(&mut text).unwrap().completed().unwrap();
        assert!(refreshed.changed());
        assert!(!refreshed.result.has_errors());
        assert!(refreshed.result.autofill().is_none());

        let filled = text
            .lines()
            .find_map(|line| line.strip_prefix("PrivateKey = "))
            .unwrap();
        assert!(decode_key(filled).is_ok());
        assert!(refreshed.result.derived_public_key().is_some());

        let again = session.refresh(&mut text).unwrap().completed().unwrap();
        assert!(!again.changed());
        assert_eq!(again.result, refreshed.result);
        assert_eq!(session.state(), ScanState::Idle);
    }

    #[test]
    fn rescans_are_identical_for_unchanged_text() {
        let session = seeded();
        let text = "[Peer]\nAllowedIPs = 10.0.0.1/33\nMTU = 70000\n";
        assert_eq!(session.scan(text), session.scan(text));
    }

    struct ReentrantBuffer {
        text: String,
        session: Rc<ScanSession<StdRng>>,
        nested: Vec<bool>,
    }

    impl TextBuffer for ReentrantBuffer {
        fn text(&self) -> &str {
            &self.text
        }

        fn apply(&mut self, splice: &Splice) -> EditResult<()> {
            self.text = splice.apply(&self.text)?;
            // An editor would re-highlight on every change.
            let skipped = self.session.scan(&self.text).is_skipped();
            self.nested.push(skipped);
            Ok(())
        }
    }

    #[test]
    fn nested_scan_during_autofill_is_skipped() {
        let session = Rc::new(seeded());
        let mut buffer = ReentrantBuffer {
            text: "[Interface]\nPrivateKey = \n".to_string(),
            session: Rc::clone(&session),
            nested: Vec::new(),
        };

        let outcome = session.refresh(&mut buffer).unwrap();
        assert!(!outcome.is_skipped());
        assert_eq!(buffer.nested, vec![true]);
        assert_eq!(session.state(), ScanState::Idle);
        assert!(!session.scan(&buffer.text).is_skipped());
    }
}
