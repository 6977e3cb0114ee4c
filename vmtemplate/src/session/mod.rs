//! Remote session lifecycle.
//!
//! A [`Session`] owns exactly one authenticated client. It is closed either
//! explicitly through [`Session::close`] (which consumes it) or, if the
//! owning future is dropped first, by a best-effort logout spawned from
//! `Drop`. Either way the logout is issued once.

mod settle;

pub use settle::SettlePolicy;

use crate::artifact::VmLocator;
use crate::vsphere::{Endpoint, VmRef, VsphereClient, VsphereConnector};
use std::sync::Arc;
use uuid::Uuid;
use vmtemplate_shared::errors::{VmTemplateError, VmTemplateResult};

/// Opens sessions and waits for the target VM to settle.
#[derive(Clone)]
pub struct SessionManager {
    connector: Arc<dyn VsphereConnector>,
    settle: SettlePolicy,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn VsphereConnector>, settle: SettlePolicy) -> Self {
        Self { connector, settle }
    }

    /// Log in to `endpoint`.
    ///
    /// Any connector failure is reported as `Connection`.
    pub async fn connect(&self, endpoint: &Endpoint) -> VmTemplateResult<Session> {
        tracing::info!(
            endpoint = %endpoint,
            insecure = endpoint.insecure,
            "Connecting to vSphere"
        );

        let client = self.connector.connect(endpoint).await.map_err(|e| match e {
            VmTemplateError::Connection(_) => e,
            other => VmTemplateError::Connection(other.to_string()),
        })?;

        let session = Session::new(client);
        tracing::debug!(session_id = %session.id(), "vSphere session established");
        Ok(session)
    }

    /// Block until the VM is registered and powered off.
    pub async fn wait_until_settled(
        &self,
        session: &Session,
        locator: &VmLocator,
    ) -> VmTemplateResult<VmRef> {
        tracing::info!(
            vm = %locator,
            timeout_ms = self.settle.timeout_ms,
            "Waiting for vSphere to settle the virtual machine"
        );
        settle::wait_until_settled(session.client.as_ref(), locator, &self.settle).await
    }
}

/// One live, authenticated connection.
pub struct Session {
    id: Uuid,
    client: Arc<dyn VsphereClient>,
    closed: bool,
}

impl Session {
    fn new(client: Arc<dyn VsphereClient>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client,
            closed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn client(&self) -> Arc<dyn VsphereClient> {
        Arc::clone(&self.client)
    }

    /// Log out. A failure is returned for the caller to record; it must not
    /// change the outcome of the work done inside the session.
    pub async fn close(mut self) -> VmTemplateResult<()> {
        self.closed = true;
        tracing::debug!(session_id = %self.id, "Logging out of vSphere");
        self.client.logout().await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        tracing::warn!(session_id = %self.id, "Session dropped without close, logging out");

        // Async logout needs a runtime; without one the server-side session
        // simply expires.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let client = Arc::clone(&self.client);
            let id = self.id;
            handle.spawn(async move {
                if let Err(e) = client.logout().await {
                    tracing::warn!(session_id = %id, "Failed to log out dropped session: {}", e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vsphere::fake::{FakeConnector, FakeOp, FakeVsphere, RemoteCall};
    use url::Url;

    fn endpoint(insecure: bool) -> Endpoint {
        let mut url = Url::parse("https://vcenter.local/sdk").unwrap();
        url.set_username("admin").unwrap();
        url.set_password(Some("secret")).unwrap();
        Endpoint { url, insecure }
    }

    fn manager(inventory: FakeVsphere) -> (SessionManager, FakeConnector) {
        let connector = FakeConnector::new(inventory);
        let manager = SessionManager::new(Arc::new(connector.clone()), SettlePolicy::default());
        (manager, connector)
    }

    #[tokio::test]
    async fn test_connect_passes_insecure_flag() {
        let (manager, connector) = manager(FakeVsphere::new());

        let session = manager.connect(&endpoint(true)).await.unwrap();
        session.close().await.unwrap();

        let calls = connector.inventory().calls();
        assert!(matches!(
            &calls[0],
            RemoteCall::Connect { insecure: true, endpoint } if !endpoint.contains("secret")
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_is_connection_error() {
        let (manager, _) = manager(FakeVsphere::new().fail_on(FakeOp::Connect));

        let err = manager.connect(&endpoint(false)).await.err().unwrap();
        assert!(matches!(err, VmTemplateError::Connection(_)));
    }

    #[tokio::test]
    async fn test_close_logs_out_once() {
        let (manager, connector) = manager(FakeVsphere::new());

        let session = manager.connect(&endpoint(false)).await.unwrap();
        session.close().await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(connector.inventory().logout_count(), 1);
    }

    #[tokio::test]
    async fn test_close_failure_is_returned() {
        let (manager, connector) = manager(FakeVsphere::new().fail_on(FakeOp::Logout));

        let session = manager.connect(&endpoint(false)).await.unwrap();
        assert!(session.close().await.is_err());
        assert_eq!(connector.inventory().logout_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_without_close_still_logs_out() {
        let (manager, connector) = manager(FakeVsphere::new());

        let session = manager.connect(&endpoint(false)).await.unwrap();
        drop(session);
        // let the spawned logout run
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(connector.inventory().logout_count(), 1);
    }
}
