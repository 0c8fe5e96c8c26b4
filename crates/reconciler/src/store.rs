//! CatalogActor - sole owner of the event catalog.
//!
//! Every read and write of the catalog goes through this actor's mailbox, so
//! a refresh merge and a registration confirmation can never interleave.
//! Messages follow the usual split:
//! - Commands are fire-and-forget (`send_message`)
//! - Queries carry an `RpcReplyPort` (use [`CatalogHandle`])

use chrono::NaiveDate;
use ractor::concurrency::JoinHandle;
use ractor::rpc::CallResult;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tracing::{debug, info, warn};

use classbook_catalog::{EventCatalog, EventKey, EventListing, EventRow, RegistrationId};

use crate::error::Error;
use crate::source::DesiredStateSource;

const ACTOR_NAME: &str = "catalog";

#[derive(Clone, Default)]
pub struct CatalogActorDef;

pub struct CatalogState {
    catalog: EventCatalog,
    loaded: bool,
}

/// What a merge produced.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The catalog after the merge.
    pub catalog: EventCatalog,
    /// Events dropped because their date has passed.
    pub pruned: usize,
}

/// A copy of the catalog at one point in its mailbox order.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub catalog: EventCatalog,
    /// Whether at least one refresh has completed.
    pub loaded: bool,
}

/// Messages for the CatalogActor.
#[derive(Debug)]
pub enum CatalogMessage {
    // COMMANDS
    /// Overlay desired-state rows onto known events.
    ApplyRows { rows: Vec<EventRow> },

    // QUERIES
    /// Run the refresh merge: left-join `listings` against the catalog,
    /// overlay `rows`, drop everything dated before `today`, then mark the
    /// catalog loaded.
    Merge {
        listings: Vec<EventListing>,
        rows: Vec<EventRow>,
        today: NaiveDate,
        reply: RpcReplyPort<MergeOutcome>,
    },

    /// Set or clear one registration. Replies `false` for unknown keys.
    SetRegistration {
        key: EventKey,
        registration: Option<RegistrationId>,
        reply: RpcReplyPort<bool>,
    },

    /// Clear a registration cancelled with the service. Rows still naming
    /// it are ignored from then on. Replies `false` for unknown keys.
    ReleaseRegistration {
        key: EventKey,
        registration: RegistrationId,
        reply: RpcReplyPort<bool>,
    },

    /// Copy of the whole catalog.
    Snapshot { reply: RpcReplyPort<CatalogSnapshot> },

    /// Stored rows for one date.
    RowsOn {
        date: NaiveDate,
        reply: RpcReplyPort<Vec<EventRow>>,
    },
}

impl Actor for CatalogActorDef {
    type Msg = CatalogMessage;
    type State = CatalogState;
    type Arguments = EventCatalog;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        catalog: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(events = catalog.len(), "CatalogActor starting");
        Ok(CatalogState {
            catalog,
            loaded: false,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            CatalogMessage::ApplyRows { rows } => {
                let touched = state.catalog.apply_rows(&rows);
                debug!(rows = rows.len(), touched, "Applied desired-state rows");
            }

            CatalogMessage::Merge {
                listings,
                rows,
                today,
                reply,
            } => {
                let mut merged = state.catalog.merge_listings(listings);
                merged.apply_rows(&rows);
                let pruned = merged.prune_before(today);
                state.catalog = merged;
                state.loaded = true;

                debug!(events = state.catalog.len(), pruned, "Catalog merged");

                let _ = reply.send(MergeOutcome {
                    catalog: state.catalog.clone(),
                    pruned,
                });
            }

            CatalogMessage::SetRegistration {
                key,
                registration,
                reply,
            } => {
                let known = state.catalog.set_registration(&key, registration);
                debug!(event = %key, ?registration, known, "Registration updated");
                let _ = reply.send(known);
            }

            CatalogMessage::ReleaseRegistration {
                key,
                registration,
                reply,
            } => {
                let known = state.catalog.release_registration(&key, registration);
                debug!(event = %key, %registration, known, "Registration released");
                let _ = reply.send(known);
            }

            CatalogMessage::Snapshot { reply } => {
                let _ = reply.send(CatalogSnapshot {
                    catalog: state.catalog.clone(),
                    loaded: state.loaded,
                });
            }

            CatalogMessage::RowsOn { date, reply } => {
                let _ = reply.send(state.catalog.rows_on(date));
            }
        }
        Ok(())
    }
}

/// Typed access to a running CatalogActor.
#[derive(Clone)]
pub struct CatalogHandle {
    actor: ActorRef<CatalogMessage>,
}

impl CatalogHandle {
    /// Spawn a CatalogActor seeded with `catalog`.
    pub async fn spawn(catalog: EventCatalog) -> Result<(Self, JoinHandle<()>), Error> {
        let (actor, handle) = Actor::spawn(None, CatalogActorDef, catalog)
            .await
            .map_err(|e| Error::spawn_failed(ACTOR_NAME, e.to_string()))?;
        Ok((Self { actor }, handle))
    }

    /// Overlay desired-state rows. Ordered before any later query.
    pub fn apply_rows(&self, rows: Vec<EventRow>) -> Result<(), Error> {
        self.actor
            .send_message(CatalogMessage::ApplyRows { rows })
            .map_err(|_| Error::actor_unavailable(ACTOR_NAME))
    }

    /// Run the refresh merge.
    pub async fn merge(
        &self,
        listings: Vec<EventListing>,
        rows: Vec<EventRow>,
        today: NaiveDate,
    ) -> Result<MergeOutcome, Error> {
        self.query(|reply| CatalogMessage::Merge {
            listings,
            rows,
            today,
            reply,
        })
        .await
    }

    /// Set or clear one registration.
    pub async fn set_registration(
        &self,
        key: EventKey,
        registration: Option<RegistrationId>,
    ) -> Result<bool, Error> {
        self.query(|reply| CatalogMessage::SetRegistration {
            key,
            registration,
            reply,
        })
        .await
    }

    /// Clear a registration that was cancelled with the service.
    pub async fn release_registration(
        &self,
        key: EventKey,
        registration: RegistrationId,
    ) -> Result<bool, Error> {
        self.query(|reply| CatalogMessage::ReleaseRegistration {
            key,
            registration,
            reply,
        })
        .await
    }

    /// Copy of the whole catalog.
    pub async fn snapshot(&self) -> Result<CatalogSnapshot, Error> {
        self.query(|reply| CatalogMessage::Snapshot { reply }).await
    }

    /// Stored rows for one date.
    pub async fn rows_on(&self, date: NaiveDate) -> Result<Vec<EventRow>, Error> {
        self.query(|reply| CatalogMessage::RowsOn { date, reply }).await
    }

    /// Write the current rows for `date` back to the store.
    pub async fn write_through(
        &self,
        source: &dyn DesiredStateSource,
        date: NaiveDate,
    ) -> Result<(), Error> {
        let rows = self.rows_on(date).await?;
        source.write_rows(date, rows).await?;
        Ok(())
    }

    /// Pull the latest user intent from `source` into the catalog.
    ///
    /// Failures are logged and the catalog keeps what it had.
    pub async fn sync_desired_state(&self, source: &dyn DesiredStateSource) {
        match source.read_all().await {
            Ok(rows) => {
                if let Err(e) = self.apply_rows(rows) {
                    warn!(error = %e, "Failed to apply desired state");
                }
            }
            Err(e) => warn!(error = %e, "Failed to read desired state"),
        }
    }

    /// Stop the actor.
    pub fn stop(&self) {
        self.actor.stop(None);
    }

    async fn query<T>(&self, build: impl FnOnce(RpcReplyPort<T>) -> CatalogMessage) -> Result<T, Error>
    where
        T: Send + 'static,
    {
        match self.actor.call(build, None).await {
            Ok(CallResult::Success(value)) => Ok(value),
            Ok(_) | Err(_) => Err(Error::actor_unavailable(ACTOR_NAME)),
        }
    }
}
