//! gRPC client for a remote notary cluster.
//!
//! [`NotaryClient`] talks to the cluster's `NotaryService`. It sends
//! commands to the leader when it knows it, follows leader hints in
//! refusals and retries transient failures with exponential backoff.

use crate::error::{ClusterError, ClusterResult};
use crate::proto::notary_service_client::NotaryServiceClient;
use crate::proto::{
    AddNodeRequest, ExecuteRequest, ExecuteResponse, QueryRequest, RemoveNodeRequest,
    StatusRequest, StatusResponse,
};
use crate::types::ClusterNodeId;
use notary_core::{
    CommitResult, ConsumingTransaction, NotaryCommand, NotaryResponse, Party, SecureHash,
    StateRef, UniquenessFuture, UniquenessProvider,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tonic::transport::Channel;

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts before giving up, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Upper bound for the delay between attempts.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

/// What to do after a failed attempt.
enum Retry {
    /// Try again right away at this address.
    Redirect(String),
    /// Try again after backing off, at the next endpoint.
    Backoff(ClusterError),
    /// Give up.
    Fail(ClusterError),
}

/// Client for a notary cluster.
pub struct NotaryClient {
    endpoints: Vec<String>,
    next_endpoint: Mutex<usize>,
    leader_addr: Mutex<Option<String>>,
    channels: RwLock<HashMap<String, Channel>>,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl NotaryClient {
    /// Client for a cluster reachable at any of `endpoints` (`host:port`).
    ///
    /// Connections are established lazily.
    pub fn new(endpoints: impl IntoIterator<Item = impl Into<String>>) -> ClusterResult<Self> {
        let endpoints: Vec<String> = endpoints.into_iter().map(Into::into).collect();
        if endpoints.is_empty() {
            return Err(ClusterError::Config("no notary endpoints given".into()));
        }
        Ok(Self {
            endpoints,
            next_endpoint: Mutex::new(0),
            leader_addr: Mutex::new(None),
            channels: RwLock::new(HashMap::new()),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(10),
        })
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the deadline of each individual request.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Atomically claim `inputs` for `tx_id`.
    pub async fn commit(
        &self,
        inputs: Vec<StateRef>,
        tx_id: SecureHash,
        requesting_party: Party,
    ) -> ClusterResult<CommitResult> {
        let command = NotaryCommand::claim(inputs, tx_id, requesting_party);
        Ok(self.execute(&command).await?.into_commit_result()?)
    }

    /// Who consumed `state_ref`, read through the leader's log.
    pub async fn get(&self, state_ref: StateRef) -> ClusterResult<Option<ConsumingTransaction>> {
        Ok(self
            .execute(&NotaryCommand::Get { key: state_ref })
            .await?
            .into_value()?)
    }

    /// Number of consumed states, read through the leader's log.
    pub async fn size(&self) -> ClusterResult<u64> {
        Ok(self.execute(&NotaryCommand::Size).await?.into_size()?)
    }

    /// Who consumed `state_ref` according to the replica at `addr`.
    ///
    /// Reads the replica's applied state without going through the log.
    pub async fn get_local(
        &self,
        addr: &str,
        state_ref: StateRef,
    ) -> ClusterResult<Option<ConsumingTransaction>> {
        let command = serde_json::to_vec(&NotaryCommand::Get { key: state_ref })?;
        let resp = self
            .client(addr)?
            .query(self.request(QueryRequest { command }))
            .await?
            .into_inner();
        if !resp.success {
            return Err(ClusterError::Remote(resp.error));
        }
        let response: NotaryResponse = serde_json::from_slice(&resp.result)?;
        Ok(response.into_value()?)
    }

    /// Status of the replica at `addr`, or of the first reachable endpoint.
    pub async fn status(&self, addr: Option<&str>) -> ClusterResult<StatusResponse> {
        if let Some(addr) = addr {
            return Ok(self
                .client(addr)?
                .get_status(self.request(StatusRequest {}))
                .await?
                .into_inner());
        }

        let mut last_error = None;
        for endpoint in &self.endpoints {
            match self
                .client(endpoint)?
                .get_status(self.request(StatusRequest {}))
                .await
            {
                Ok(resp) => return Ok(resp.into_inner()),
                Err(status) => {
                    self.drop_channel(endpoint);
                    last_error = Some(status.into());
                }
            }
        }
        Err(last_error.unwrap_or(ClusterError::NotLeader { leader: None }))
    }

    /// Add a replica as a voter. Sent to the current leader.
    pub async fn add_node(&self, node_id: ClusterNodeId, addr: impl Into<String>) -> ClusterResult<()> {
        let leader = self.find_leader().await?;
        let resp = self
            .client(&leader)?
            .add_node(self.request(AddNodeRequest {
                node_id,
                address: addr.into(),
            }))
            .await?
            .into_inner();
        if resp.success {
            Ok(())
        } else {
            Err(ClusterError::Remote(resp.error))
        }
    }

    /// Remove a voter. Sent to the current leader.
    pub async fn remove_node(&self, node_id: ClusterNodeId) -> ClusterResult<()> {
        let leader = self.find_leader().await?;
        let resp = self
            .client(&leader)?
            .remove_node(self.request(RemoveNodeRequest { node_id }))
            .await?
            .into_inner();
        if resp.success {
            Ok(())
        } else {
            Err(ClusterError::Remote(resp.error))
        }
    }

    /// Replicate a command, retrying until it is applied or the retry
    /// policy runs out.
    pub async fn execute(&self, command: &NotaryCommand) -> ClusterResult<NotaryResponse> {
        let payload = serde_json::to_vec(command)?;
        let mut target = self.initial_target();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = self.execute_once(&target, &payload).await;
            let retry = match outcome {
                Ok(response) => return Ok(response),
                Err(retry) => retry,
            };

            if attempt >= self.retry.max_attempts {
                return Err(match retry {
                    Retry::Redirect(leader) => ClusterError::Remote(format!(
                        "still redirected to {leader} after {attempt} attempts"
                    )),
                    Retry::Backoff(e) | Retry::Fail(e) => e,
                });
            }

            match retry {
                Retry::Redirect(leader) => {
                    tracing::debug!(from = %target, to = %leader, "following leader hint");
                    *self.leader_addr.lock() = Some(leader.clone());
                    target = leader;
                }
                Retry::Backoff(e) => {
                    let delay = self.retry.backoff(attempt);
                    tracing::debug!(
                        target = %target,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying notary command"
                    );
                    *self.leader_addr.lock() = None;
                    tokio::time::sleep(delay).await;
                    target = self.rotate_endpoint();
                }
                Retry::Fail(e) => return Err(e),
            }
        }
    }

    async fn execute_once(&self, target: &str, payload: &[u8]) -> Result<NotaryResponse, Retry> {
        let mut client = self.client(target).map_err(Retry::Fail)?;
        let request = self.request(ExecuteRequest {
            command: payload.to_vec(),
        });

        let resp = match client.execute(request).await {
            Ok(resp) => resp.into_inner(),
            Err(status) => {
                self.drop_channel(target);
                return Err(match status.code() {
                    tonic::Code::InvalidArgument => Retry::Fail(status.into()),
                    _ => Retry::Backoff(status.into()),
                });
            }
        };

        if resp.success {
            return serde_json::from_slice(&resp.result).map_err(|e| Retry::Fail(e.into()));
        }
        Err(refusal(target, resp))
    }

    async fn find_leader(&self) -> ClusterResult<String> {
        if let Some(addr) = self.leader_addr.lock().clone() {
            return Ok(addr);
        }
        let status = self.status(None).await?;
        let leader = status
            .members
            .iter()
            .find(|m| m.is_leader && !m.address.is_empty())
            .map(|m| m.address.clone())
            .ok_or(ClusterError::NotLeader {
                leader: (status.leader_id != 0).then_some(status.leader_id),
            })?;
        *self.leader_addr.lock() = Some(leader.clone());
        Ok(leader)
    }

    fn initial_target(&self) -> String {
        if let Some(addr) = self.leader_addr.lock().clone() {
            return addr;
        }
        let index = *self.next_endpoint.lock();
        self.endpoints[index % self.endpoints.len()].clone()
    }

    fn rotate_endpoint(&self) -> String {
        let mut index = self.next_endpoint.lock();
        *index = (*index + 1) % self.endpoints.len();
        self.endpoints[*index].clone()
    }

    fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request.set_timeout(self.request_timeout);
        request
    }

    fn client(&self, addr: &str) -> ClusterResult<NotaryServiceClient<Channel>> {
        if let Some(channel) = self.channels.read().get(addr) {
            return Ok(NotaryServiceClient::new(channel.clone()));
        }
        let channel = Channel::from_shared(format!("http://{addr}"))
            .map_err(|e| ClusterError::Config(e.to_string()))?
            .connect_timeout(self.request_timeout)
            .connect_lazy();
        self.channels
            .write()
            .insert(addr.to_string(), channel.clone());
        Ok(NotaryServiceClient::new(channel))
    }

    fn drop_channel(&self, addr: &str) {
        self.channels.write().remove(addr);
    }
}

/// Classify a refused `Execute`: follow a fresh leader hint, otherwise
/// back off carrying the replica's own error.
fn refusal(target: &str, resp: ExecuteResponse) -> Retry {
    if !resp.leader_addr.is_empty() && resp.leader_addr != target {
        return Retry::Redirect(resp.leader_addr);
    }
    let leader = (resp.leader_id != 0).then_some(resp.leader_id);
    tracing::debug!(target = %target, error = %resp.error, ?leader, "command refused");
    if resp.error.is_empty() {
        Retry::Backoff(ClusterError::NotLeader { leader })
    } else {
        Retry::Backoff(ClusterError::Remote(resp.error))
    }
}

impl UniquenessProvider for NotaryClient {
    fn commit(
        &self,
        inputs: Vec<StateRef>,
        tx_id: SecureHash,
        requesting_party: Party,
    ) -> UniquenessFuture<'_, CommitResult> {
        Box::pin(async move { Ok(NotaryClient::commit(self, inputs, tx_id, requesting_party).await?) })
    }

    fn get(&self, state_ref: StateRef) -> UniquenessFuture<'_, Option<ConsumingTransaction>> {
        Box::pin(async move { Ok(NotaryClient::get(self, state_ref).await?) })
    }

    fn size(&self) -> UniquenessFuture<'_, u64> {
        Box::pin(async move { Ok(NotaryClient::size(self).await?) })
    }
}
