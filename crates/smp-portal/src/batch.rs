use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;

use crate::auth::{self, AuthError};
use crate::extract::extract_commodities;
use crate::session::Session;
use crate::token;
use crate::transport::{NetworkError, PortalRequest, RequestBody, Transport};
use crate::types::{
    BatchResult, Credential, EntityResult, EntityStatus, FilterContext, TargetEntity,
};

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
}

#[derive(Debug, thiserror::Error)]
enum EntityError {
    #[error("no CSRF token on the detail-report page")]
    TokenNotFound,
    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl From<EntityError> for EntityStatus {
    fn from(error: EntityError) -> Self {
        match error {
            EntityError::TokenNotFound => EntityStatus::TokenUnavailable,
            EntityError::Network(e) => EntityStatus::RequestFailed {
                reason: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Delay between consecutive entities.
    pub pause: Duration,
    /// Entities processed at once over the shared session.
    pub workers: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            pause: Duration::from_millis(500),
            workers: 1,
        }
    }
}

pub struct BatchOrchestrator<T> {
    session: Session<T>,
    options: BatchOptions,
}

impl<T: Transport> BatchOrchestrator<T> {
    pub fn new(session: Session<T>, options: BatchOptions) -> Self {
        Self {
            session,
            options: BatchOptions {
                workers: options.workers.max(1),
                ..options
            },
        }
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub async fn authenticate(&mut self, credential: &Credential) -> Result<(), AuthError> {
        auth::authenticate(&mut self.session, credential).await
    }

    /// Logs in, then queries every target.
    ///
    /// Only a failed login aborts the run. Once logged in, the result holds
    /// exactly one entry per target, in target order, whatever happened to
    /// the individual queries. Cancelling `cancel` stops scheduling and drops
    /// queries still in flight; those entities come back as
    /// [`EntityStatus::NotAttempted`], while finished ones keep their result.
    pub async fn run_batch(
        &mut self,
        credential: &Credential,
        targets: &[TargetEntity],
        filter: &FilterContext,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, BatchError> {
        log::info!("Starting batch for {} entities", targets.len());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::warn!("Batch cancelled during login");
                return Ok(not_attempted(targets));
            }
            result = self.authenticate(credential) => result?,
        }

        let slots = self.process_all(targets, filter, cancel).await;
        let entities: Vec<EntityResult> = slots
            .into_iter()
            .zip(targets)
            .map(|(slot, entity)| {
                slot.unwrap_or_else(|| {
                    EntityResult::empty(entity.clone(), EntityStatus::NotAttempted)
                })
            })
            .collect();

        log::info!("Completed batch of {} entities", entities.len());
        Ok(BatchResult::from(entities))
    }

    async fn process_all(
        &self,
        targets: &[TargetEntity],
        filter: &FilterContext,
        cancel: &CancellationToken,
    ) -> Vec<Option<EntityResult>> {
        let mut slots: Vec<Option<EntityResult>> = vec![None; targets.len()];
        let mut pending = targets.iter().enumerate();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < self.options.workers && !cancel.is_cancelled() {
                let Some((index, entity)) = pending.next() else {
                    break;
                };
                in_flight.push(async move {
                    // between entities, never after the last one
                    if index > 0 && !self.options.pause.is_zero() {
                        tokio::time::sleep(self.options.pause).await;
                    }
                    (index, self.extract_entity(entity, filter).await)
                });
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::warn!(
                        "Batch cancelled with {} request(s) in flight",
                        in_flight.len()
                    );
                    break;
                }
                Some((index, result)) = in_flight.next() => {
                    slots[index] = Some(result);
                }
            }
        }

        slots
    }

    /// Refreshes the page token and runs the filtered query for one entity.
    /// Failures are folded into the returned status.
    pub async fn extract_entity(
        &self,
        entity: &TargetEntity,
        filter: &FilterContext,
    ) -> EntityResult {
        log::info!("Fetching data for {}", entity);

        match self.query_entity(entity, filter).await {
            Ok(fragment) => {
                let (milk, biscuit) = extract_commodities(&fragment);
                match &milk {
                    Some(record) => log::info!("  Milk data: {}", record.date),
                    None => log::warn!("  No milk data found for {}", entity.id),
                }
                match &biscuit {
                    Some(record) => log::info!("  Biscuit data: {}", record.date),
                    None => log::warn!("  No biscuit data found for {}", entity.id),
                }
                EntityResult::extracted(entity.clone(), milk, biscuit)
            }
            Err(e) => {
                log::error!("Request failed for {}: {}", entity.id, e);
                EntityResult::empty(entity.clone(), e.into())
            }
        }
    }

    async fn query_entity(
        &self,
        entity: &TargetEntity,
        filter: &FilterContext,
    ) -> Result<String, EntityError> {
        let url = self.session.url(crate::DETAIL_REPORT_PATH);

        let page = self.session.fetch(&PortalRequest::get(url.as_str())).await?;
        let (csrf, source) = token::page_token(&page.body).ok_or(EntityError::TokenNotFound)?;
        log::debug!("  Using CSRF token from {}", source);

        let body = serde_json::json!({
            "districtId": filter.district,
            "tehsilId": filter.tehsil,
            "markazId": filter.markaz,
            "schoolNameId": entity.id,
            "daterange": "",
            "emiscode": "",
        });

        let request = PortalRequest::post(url.as_str(), RequestBody::Json(body))
            .header("X-CSRF-TOKEN", csrf)
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Accept", "text/html, */*; q=0.01")
            .header("Referer", url.as_str());

        Ok(self.session.fetch(&request).await?.body)
    }
}

fn not_attempted(targets: &[TargetEntity]) -> BatchResult {
    targets
        .iter()
        .map(|entity| EntityResult::empty(entity.clone(), EntityStatus::NotAttempted))
        .collect::<Vec<_>>()
        .into()
}
