//! Element resolution by polling.
//!
//! The locator turns an [`ElementDescriptor`] into a live element. Lookups
//! are retried a bounded number of times with a fixed delay between
//! attempts, either until the element shows up or, in "until absent" mode,
//! until it is gone.
//!
//! Before each attempt the locator hands control to a [`LocateProbe`]. The
//! engine uses the probe to report progress on the owning action and to
//! honour pause, retry, skip and stop commands that arrive mid-search.

mod descriptor;

pub use descriptor::DescriptorBuilder;
pub use descriptor::ElementDescriptor;
pub use descriptor::Transform;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::clock::Clock;
use crate::environment::{ElementInfo, Environment};
use crate::error::ActionError;

/// Polling parameters for a single lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocateOptions {
    /// Delay between two attempts.
    pub delay: Duration,

    /// Number of attempts before giving up.
    pub max_tries: u32,

    /// Succeed when the element is missing instead of when it is found.
    pub until_absent: bool,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1000),
            max_tries: 10,
            until_absent: false,
        }
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    Found(ElementInfo),

    /// The element (or one of its ancestors) is not in the document.
    Absent,

    /// The operator skipped the action while the lookup was suspended.
    Skipped,
}

/// What the locator should do before its next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeDirective {
    Proceed,

    /// Reset the attempt counter to zero.
    Restart,

    /// Abandon the lookup with [`Located::Skipped`].
    Skip,
}

/// Observer consulted before every lookup attempt.
#[async_trait]
pub trait LocateProbe: Send {
    /// Called with the 0-based attempt index before presence is evaluated.
    ///
    /// # Errors
    ///
    /// Returning an error ends the lookup with that error, e.g.
    /// [`ActionError::Aborted`] after a stop.
    async fn before_attempt(&mut self, attempt: u32) -> Result<ProbeDirective, ActionError>;
}

/// Probe that never interferes.
#[derive(Debug, Default)]
pub struct NoProbe;

#[async_trait]
impl LocateProbe for NoProbe {
    async fn before_attempt(&mut self, _attempt: u32) -> Result<ProbeDirective, ActionError> {
        Ok(ProbeDirective::Proceed)
    }
}

/// Resolves descriptors against an environment.
#[derive(Clone)]
pub struct Locator {
    env: Arc<dyn Environment>,
    clock: Arc<dyn Clock>,
}

impl Locator {
    pub fn new(env: Arc<dyn Environment>, clock: Arc<dyn Clock>) -> Self {
        Self { env, clock }
    }

    /// Locates `descriptor`, polling according to `options`.
    ///
    /// In presence mode every ancestor is located first, with the same
    /// options, and becomes the search root of the next descriptor down the
    /// chain. In "until absent" mode each attempt resolves the whole chain
    /// once, and a missing ancestor counts as an absent element.
    ///
    /// # Errors
    ///
    /// - `ActionError::ElementNotFound` when a presence lookup runs out of attempts
    /// - `ActionError::ElementStillPresent` when an absence lookup runs out of attempts
    /// - `ActionError::EffectFailed` when the environment fails a query
    /// - whatever error the probe returns
    pub async fn locate(
        &self,
        descriptor: &ElementDescriptor,
        options: LocateOptions,
        probe: &mut dyn LocateProbe,
    ) -> Result<Located, ActionError> {
        debug!(element = %descriptor, ?options, "Looking for element");

        if options.until_absent {
            return self.poll_absent(descriptor, options, probe).await;
        }

        let mut root: Option<ElementInfo> = None;
        for step in descriptor.ancestry() {
            match self.poll_present(&step, root.as_ref(), options, probe).await? {
                Located::Found(info) => root = Some(info),
                other => return Ok(other),
            }
        }

        Ok(root.map_or(Located::Absent, Located::Found))
    }

    async fn poll_present(
        &self,
        descriptor: &ElementDescriptor,
        root: Option<&ElementInfo>,
        options: LocateOptions,
        probe: &mut dyn LocateProbe,
    ) -> Result<Located, ActionError> {
        let mut attempt = 0;
        while attempt < options.max_tries {
            match probe.before_attempt(attempt).await? {
                ProbeDirective::Proceed => {}
                ProbeDirective::Restart => {
                    attempt = 0;
                    continue;
                }
                ProbeDirective::Skip => return Ok(Located::Skipped),
            }

            let found = descriptor
                .resolve(self.env.as_ref(), root.map(|info| &info.handle))
                .await?;
            debug!(element = %descriptor, attempt, found = found.is_some(), "Lookup attempt");
            if let Some(info) = found {
                return Ok(Located::Found(info));
            }

            attempt += 1;
            if attempt < options.max_tries {
                self.clock.sleep(options.delay).await;
            }
        }

        Err(ActionError::ElementNotFound {
            name: descriptor.display_name(),
            tries: options.max_tries,
        })
    }

    async fn poll_absent(
        &self,
        descriptor: &ElementDescriptor,
        options: LocateOptions,
        probe: &mut dyn LocateProbe,
    ) -> Result<Located, ActionError> {
        let mut attempt = 0;
        while attempt < options.max_tries {
            match probe.before_attempt(attempt).await? {
                ProbeDirective::Proceed => {}
                ProbeDirective::Restart => {
                    attempt = 0;
                    continue;
                }
                ProbeDirective::Skip => return Ok(Located::Skipped),
            }

            let found = descriptor.resolve_chain(self.env.as_ref()).await?;
            debug!(element = %descriptor, attempt, found = found.is_some(), "Absence check");
            if found.is_none() {
                return Ok(Located::Absent);
            }

            attempt += 1;
            if attempt < options.max_tries {
                self.clock.sleep(options.delay).await;
            }
        }

        Err(ActionError::ElementStillPresent {
            name: descriptor.display_name(),
            tries: options.max_tries,
        })
    }
}
