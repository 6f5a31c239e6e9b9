//! Walk driver.
//!
//! A walk repeatedly asks the agent for the OIDs following the last one it
//! returned and hands each batch to a feed callback. SNMPv1 sessions use
//! GETNEXT and stop when the agent answers noSuchName; v2c and v3 sessions
//! use GETBULK and stop at endOfMibView. The feed callback ends the walk early
//! by returning [`ControlFlow::Break`].

use std::ops::ControlFlow;

use super::Session;
use super::config::BulkOptions;
use crate::error::{Error, ErrorStatus, Result};
use crate::oid::{Oid, oid_in_subtree};
use crate::value::Value;
use crate::varbind::VarBind;
use crate::version::Version;

/// Progress of one walk.
struct WalkState {
    current: Oid,
    /// Last OID handed to the feed callback.
    /// Used to detect non-increasing OIDs (agent misbehavior).
    last_returned: Option<Oid>,
    requests: usize,
    limit: usize,
    check_order: bool,
}

impl WalkState {
    fn new(base: &Oid, limit: usize, check_order: bool) -> Self {
        Self {
            current: base.clone(),
            last_returned: None,
            requests: 0,
            limit,
            check_order,
        }
    }

    /// Count one more request, failing once the bound is reached.
    fn next_request(&mut self) -> Result<Oid> {
        if self.requests >= self.limit {
            return Err(Error::WalkLimitExceeded { limit: self.limit });
        }
        self.requests += 1;
        Ok(self.current.clone())
    }

    /// Check ordering of a batch and advance past it.
    fn accept(&mut self, batch: &[VarBind]) -> Result<()> {
        for vb in batch {
            if self.check_order
                && let Some(last) = &self.last_returned
                && vb.oid <= *last
            {
                return Err(Error::NonIncreasingOid {
                    previous: last.clone(),
                    current: vb.oid.clone(),
                });
            }
            self.last_returned = Some(vb.oid.clone());
        }
        if let Some(last) = batch.last() {
            self.current = last.oid.clone();
        }
        Ok(())
    }
}

/// One step's varbinds and whether the end of the MIB was reached.
struct Step {
    varbinds: Vec<VarBind>,
    end: bool,
}

impl Session {
    /// Walk the MIB starting after `base`, feeding each batch to `feed`.
    ///
    /// The walk does not stop at the edge of `base`'s subtree by itself; use
    /// [`subtree`](Self::subtree) for that, or break from `feed`. It ends
    /// when `feed` breaks, the agent reports the end of its MIB, or an error
    /// occurs. At most [`SessionConfig::max_walk_requests`](super::SessionConfig::max_walk_requests)
    /// requests are issued; exceeding that fails with [`Error::WalkLimitExceeded`].
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use snmp_session::{Session, oid};
    /// # use std::ops::ControlFlow;
    /// # async fn example(session: Session) -> snmp_session::Result<()> {
    /// let mut count = 0;
    /// session
    ///     .walk(&oid!(1, 3, 6, 1, 2, 1), 20, |varbinds| {
    ///         count += varbinds.len();
    ///         if count > 100 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn walk<F>(&self, base: &Oid, max_repetitions: u32, mut feed: F) -> Result<()>
    where
        F: FnMut(&[VarBind]) -> ControlFlow<()>,
    {
        let config = self.config();
        let mut state = WalkState::new(base, config.max_walk_requests, !config.backwards_get_nexts);

        loop {
            let oid = state.next_request()?;
            let Some(step) = self.walk_step(oid, max_repetitions).await? else {
                tracing::debug!(target: "snmp_session::walk", { snmp.oid = %base, snmp.requests = state.requests }, "walk reached noSuchName");
                return Ok(());
            };

            state.accept(&step.varbinds)?;
            tracing::trace!(
                target: "snmp_session::walk",
                { snmp.oid = %state.current, snmp.batch = step.varbinds.len(), end = step.end },
                "walk batch"
            );

            if step.varbinds.is_empty() {
                return Ok(());
            }
            if feed(&step.varbinds).is_break() || step.end {
                return Ok(());
            }
        }
    }

    async fn walk_step(&self, oid: Oid, max_repetitions: u32) -> Result<Option<Step>> {
        if self.version() == Version::V1 {
            return match self.get_next(std::slice::from_ref(&oid)).await {
                Ok(varbinds) => Ok(Some(Step {
                    varbinds,
                    end: false,
                })),
                Err(Error::RequestFailed {
                    status: ErrorStatus::NoSuchName,
                    ..
                }) => Ok(None),
                Err(e) => Err(e),
            };
        }

        let options = BulkOptions {
            non_repeaters: 0,
            max_repetitions,
        };
        let result = self.get_bulk(std::slice::from_ref(&oid), options).await?;
        let mut varbinds = result.repeaters.into_iter().next().unwrap_or_default();
        let before = varbinds.len();
        varbinds.retain(|vb| !matches!(vb.value, Value::EndOfMibView));
        Ok(Some(Step {
            end: varbinds.len() != before,
            varbinds,
        }))
    }

    /// Walk the subtree under `base`, feeding each trimmed batch to `feed`.
    ///
    /// Varbinds outside the subtree are dropped and end the walk.
    pub async fn subtree_with<F>(&self, base: &Oid, max_repetitions: u32, mut feed: F) -> Result<()>
    where
        F: FnMut(&[VarBind]) -> ControlFlow<()>,
    {
        self.walk(base, max_repetitions, |varbinds| {
            let inside = varbinds
                .iter()
                .take_while(|vb| oid_in_subtree(base, &vb.oid))
                .count();
            if inside > 0 && feed(&varbinds[..inside]).is_break() {
                return ControlFlow::Break(());
            }
            if inside < varbinds.len() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await
    }

    /// Collect every varbind in the subtree under `base`.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use snmp_session::{Session, oid};
    /// # async fn example(session: Session) -> snmp_session::Result<()> {
    /// for vb in session.subtree(&oid!(1, 3, 6, 1, 2, 1, 1), 10).await? {
    ///     println!("{}", vb);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn subtree(&self, base: &Oid, max_repetitions: u32) -> Result<Vec<VarBind>> {
        let mut out = Vec::new();
        self.subtree_with(base, max_repetitions, |varbinds| {
            out.extend_from_slice(varbinds);
            ControlFlow::Continue(())
        })
        .await?;
        Ok(out)
    }
}
