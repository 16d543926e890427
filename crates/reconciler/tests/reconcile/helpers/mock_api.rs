//! In-memory proxy manager.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use labelsync_npm::{NpmError, ProxyApi, ProxyHostRequest, RemoteId, RemoteProxyHost};

/// One recorded API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(ProxyHostRequest),
    Update(RemoteId, ProxyHostRequest),
    Delete(RemoteId),
    List,
}

#[derive(Default)]
struct State {
    hosts: BTreeMap<RemoteId, RemoteProxyHost>,
    next_id: RemoteId,
    calls: Vec<Call>,
    /// operation -> remaining injected failures
    failures: HashMap<&'static str, (u32, NpmError)>,
    /// create fails when a domain is already taken, like the real service
    reject_duplicates: bool,
}

/// Records calls and keeps proxy hosts in memory.
#[derive(Default)]
pub struct MockProxyApi {
    state: Mutex<State>,
}

#[allow(dead_code)]
impl MockProxyApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an existing remote host and returns its id.
    pub fn seed(&self, domains: &[&str], managed: bool) -> RemoteId {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id + 1000;
        state.hosts.insert(
            id,
            RemoteProxyHost {
                id,
                domains: domains.iter().map(|d| (*d).to_owned()).collect(),
                managed,
            },
        );
        id
    }

    /// Makes the next `times` calls of `operation` fail.
    pub fn fail(&self, operation: &'static str, times: u32, error: NpmError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(operation, (times, error));
    }

    /// Makes `create` fail with 400 when a domain is already in use.
    pub fn reject_duplicate_domains(&self) {
        self.state.lock().unwrap().reject_duplicates = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls other than `List`.
    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::List))
            .collect()
    }

    pub fn creates(&self) -> Vec<ProxyHostRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<RemoteId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn hosts(&self) -> Vec<RemoteProxyHost> {
        self.state.lock().unwrap().hosts.values().cloned().collect()
    }

    /// Removes a host without recording a call, as if deleted by hand.
    pub fn drop_host(&self, id: RemoteId) {
        self.state.lock().unwrap().hosts.remove(&id);
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn record(&self, operation: &'static str, call: Call) -> Result<(), NpmError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if let Some((remaining, error)) = state.failures.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(error.clone());
            }
        }
        Ok(())
    }
}

impl ProxyApi for MockProxyApi {
    async fn ensure_authenticated(&self) -> Result<(), NpmError> {
        Ok(())
    }

    async fn create_proxy_host(&self, request: &ProxyHostRequest) -> Result<RemoteId, NpmError> {
        self.record("create", Call::Create(request.clone()))?;
        let mut state = self.state.lock().unwrap();
        if state.reject_duplicates {
            let taken = state
                .hosts
                .values()
                .flat_map(|h| h.domains.iter())
                .find(|d| request.domains.contains(d));
            if let Some(domain) = taken {
                return Err(NpmError::RemoteApi {
                    status: 400,
                    body: format!("{domain} is already in use"),
                });
            }
        }
        state.next_id += 1;
        let id = state.next_id;
        state.hosts.insert(
            id,
            RemoteProxyHost {
                id,
                domains: request.domains.clone(),
                managed: true,
            },
        );
        Ok(id)
    }

    async fn update_proxy_host(
        &self,
        id: RemoteId,
        request: &ProxyHostRequest,
    ) -> Result<(), NpmError> {
        self.record("update", Call::Update(id, request.clone()))?;
        let mut state = self.state.lock().unwrap();
        match state.hosts.get_mut(&id) {
            Some(host) => {
                host.domains = request.domains.clone();
                host.managed = true;
                Ok(())
            }
            None => Err(NpmError::RemoteApi {
                status: 404,
                body: "not found".to_owned(),
            }),
        }
    }

    async fn delete_proxy_host(&self, id: RemoteId) -> Result<(), NpmError> {
        self.record("delete", Call::Delete(id))?;
        self.state.lock().unwrap().hosts.remove(&id);
        Ok(())
    }

    async fn list_proxy_hosts(&self) -> Result<Vec<RemoteProxyHost>, NpmError> {
        self.record("list", Call::List)?;
        Ok(self.hosts())
    }
}
