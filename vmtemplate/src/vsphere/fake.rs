//! In-memory vSphere inventory (testing only)
//!
//! `FakeVsphere` satisfies [`VsphereClient`] against a small in-memory
//! inventory, records every remote call in order, and can be told to fail
//! specific operations. `FakeConnector` hands out clients sharing that
//! inventory.

use super::{
    DatacenterRef, Endpoint, FolderRef, PowerState, RegisterSpec, SnapshotSpec, VmPlacement,
    VmRef, VsphereClient, VsphereConnector,
};
use crate::artifact::VmLocator;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use vmtemplate_shared::errors::{VmTemplateError, VmTemplateResult};

/// One recorded remote request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Connect { endpoint: String, insecure: bool },
    Datacenters,
    FindDatacenter(String),
    FindFolder(String),
    CreateFolder { parent: String, name: String },
    FindVm(String),
    FindVmInFolder { folder: String, name: String },
    PowerState(String),
    CreateSnapshot { vm: String, spec: SnapshotSpec },
    MarkAsTemplate(String),
    MoveIntoFolder { vm: String, folder: String },
    Placement(String),
    UnregisterVm(String),
    RegisterVm { folder: String, spec: RegisterSpec },
    Logout,
}

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    Connect,
    Datacenters,
    CreateFolder,
    PowerState,
    CreateSnapshot,
    MarkAsTemplate,
    MoveIntoFolder,
    UnregisterVm,
    RegisterVm,
    Logout,
}

#[derive(Debug, Clone)]
struct FakeVm {
    id: String,
    name: String,
    folder: String,
    vmx_path: String,
    host: String,
    registered: bool,
    template: bool,
    snapshots: Vec<String>,
}

#[derive(Debug)]
struct Inventory {
    datacenters: Vec<String>,
    folders: BTreeSet<String>,
    vms: Vec<FakeVm>,
    power_script: VecDeque<PowerState>,
    settled_power: PowerState,
    failures: HashSet<FakeOp>,
    calls: Vec<RemoteCall>,
    next_id: u64,
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            datacenters: Vec::new(),
            folders: BTreeSet::new(),
            vms: Vec::new(),
            power_script: VecDeque::new(),
            settled_power: PowerState::PoweredOff,
            failures: HashSet::new(),
            calls: Vec::new(),
            next_id: 1,
        }
    }
}

impl Inventory {
    fn check(&self, op: FakeOp) -> VmTemplateResult<()> {
        if self.failures.contains(&op) {
            return Err(VmTemplateError::Remote(format!("injected {:?} failure", op)));
        }
        Ok(())
    }

    fn add_folder_with_parents(&mut self, path: &str) {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            self.folders.insert(current.clone());
        }
    }

    fn allocate_id(&mut self) -> String {
        let id = format!("vm-{}", self.next_id);
        self.next_id += 1;
        id
    }

    fn vm_mut(&mut self, id: &str) -> VmTemplateResult<&mut FakeVm> {
        self.vms
            .iter_mut()
            .find(|vm| vm.id == id && vm.registered)
            .ok_or_else(|| VmTemplateError::Remote(format!("managed object {} not found", id)))
    }
}

fn vm_ref(vm: &FakeVm) -> VmRef {
    VmRef {
        id: vm.id.clone(),
        name: vm.name.clone(),
        folder: vm.folder.clone(),
    }
}

/// Shared in-memory inventory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeVsphere {
    inner: Arc<Mutex<Inventory>>,
}

impl FakeVsphere {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a datacenter together with its `vm` folder root.
    pub fn with_datacenter(self, name: &str) -> Self {
        {
            let mut inv = self.inner.lock();
            inv.datacenters.push(name.to_string());
            inv.add_folder_with_parents(&format!("/{}/vm", name));
        }
        self
    }

    /// Add a folder (and any missing parents) by absolute path.
    pub fn with_folder(self, path: &str) -> Self {
        self.inner.lock().add_folder_with_parents(path);
        self
    }

    /// Register a VM inside `folder`, relative to the datacenter's VM root.
    pub fn with_vm(self, datacenter: &str, folder: &str, name: &str) -> Self {
        {
            let mut inv = self.inner.lock();
            let root = format!("/{}/vm", datacenter);
            let folder = if folder.is_empty() {
                root
            } else {
                format!("{}/{}", root, folder.trim_matches('/'))
            };
            inv.add_folder_with_parents(&folder);
            let id = inv.allocate_id();
            inv.vms.push(FakeVm {
                id,
                name: name.to_string(),
                folder,
                vmx_path: format!("[datastore1] {}/{}.vmx", name, name),
                host: "esxi-01.local".to_string(),
                registered: true,
                template: false,
                snapshots: Vec::new(),
            });
        }
        self
    }

    /// Power states reported by successive polls, before settling on `PoweredOff`.
    pub fn with_power_states(self, states: impl IntoIterator<Item = PowerState>) -> Self {
        self.inner.lock().power_script.extend(states);
        self
    }

    /// Power state reported once the scripted states are used up.
    pub fn with_settled_power(self, state: PowerState) -> Self {
        self.inner.lock().settled_power = state;
        self
    }

    pub fn fail_on(self, op: FakeOp) -> Self {
        self.inner.lock().failures.insert(op);
        self
    }

    /// Every call issued so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.inner.lock().calls.clone()
    }

    pub fn count_calls(&self, pred: impl Fn(&RemoteCall) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn logout_count(&self) -> usize {
        self.count_calls(|c| matches!(c, RemoteCall::Logout))
    }

    pub fn has_folder(&self, path: &str) -> bool {
        self.inner.lock().folders.contains(path)
    }

    /// Whether the registered VM named `name` is a template.
    pub fn is_template(&self, name: &str) -> Option<bool> {
        self.inner
            .lock()
            .vms
            .iter()
            .find(|vm| vm.name == name && vm.registered)
            .map(|vm| vm.template)
    }

    /// Folder of the registered VM named `name`.
    pub fn folder_of(&self, name: &str) -> Option<String> {
        self.inner
            .lock()
            .vms
            .iter()
            .find(|vm| vm.name == name && vm.registered)
            .map(|vm| vm.folder.clone())
    }

    pub fn snapshots_of(&self, name: &str) -> Vec<String> {
        self.inner
            .lock()
            .vms
            .iter()
            .find(|vm| vm.name == name && vm.registered)
            .map(|vm| vm.snapshots.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: RemoteCall) {
        self.inner.lock().calls.push(call);
    }
}

#[async_trait]
impl VsphereClient for FakeVsphere {
    async fn datacenters(&self) -> VmTemplateResult<Vec<DatacenterRef>> {
        self.record(RemoteCall::Datacenters);
        let inv = self.inner.lock();
        inv.check(FakeOp::Datacenters)?;
        Ok(inv.datacenters.iter().map(DatacenterRef::new).collect())
    }

    async fn find_datacenter(&self, name: &str) -> VmTemplateResult<Option<DatacenterRef>> {
        self.record(RemoteCall::FindDatacenter(name.to_string()));
        let inv = self.inner.lock();
        Ok(inv
            .datacenters
            .iter()
            .find(|dc| dc.as_str() == name)
            .map(DatacenterRef::new))
    }

    async fn find_folder(&self, path: &str) -> VmTemplateResult<Option<FolderRef>> {
        self.record(RemoteCall::FindFolder(path.to_string()));
        let inv = self.inner.lock();
        Ok(inv.folders.contains(path).then(|| FolderRef::new(path)))
    }

    async fn create_folder(&self, parent: &FolderRef, name: &str) -> VmTemplateResult<FolderRef> {
        self.record(RemoteCall::CreateFolder {
            parent: parent.path.clone(),
            name: name.to_string(),
        });
        let mut inv = self.inner.lock();
        inv.check(FakeOp::CreateFolder)?;
        if !inv.folders.contains(&parent.path) {
            return Err(VmTemplateError::Remote(format!(
                "parent folder {} does not exist",
                parent.path
            )));
        }
        let path = parent.child_path(name);
        if !inv.folders.insert(path.clone()) {
            return Err(VmTemplateError::Remote(format!(
                "folder {} already exists",
                path
            )));
        }
        Ok(FolderRef::new(path))
    }

    async fn find_vm(&self, locator: &VmLocator) -> VmTemplateResult<Option<VmRef>> {
        self.record(RemoteCall::FindVm(locator.to_string()));
        let inv = self.inner.lock();
        let suffix = format!("/vm/{}", locator.folder);
        Ok(inv
            .vms
            .iter()
            .filter(|vm| vm.registered && vm.name == locator.name)
            .filter(|vm| match &locator.datacenter {
                Some(dc) => vm.folder.starts_with(&format!("/{}/vm", dc)),
                None => true,
            })
            .find(|vm| locator.folder.is_empty() || vm.folder.ends_with(&suffix))
            .map(vm_ref))
    }

    async fn find_vm_in_folder(
        &self,
        folder: &FolderRef,
        name: &str,
    ) -> VmTemplateResult<Option<VmRef>> {
        self.record(RemoteCall::FindVmInFolder {
            folder: folder.path.clone(),
            name: name.to_string(),
        });
        let inv = self.inner.lock();
        Ok(inv
            .vms
            .iter()
            .find(|vm| vm.registered && vm.folder == folder.path && vm.name == name)
            .map(vm_ref))
    }

    async fn power_state(&self, vm: &VmRef) -> VmTemplateResult<PowerState> {
        self.record(RemoteCall::PowerState(vm.id.clone()));
        let mut inv = self.inner.lock();
        inv.check(FakeOp::PowerState)?;
        inv.vm_mut(&vm.id)?;
        Ok(inv.power_script.pop_front().unwrap_or(inv.settled_power))
    }

    async fn create_snapshot(&self, vm: &VmRef, spec: &SnapshotSpec) -> VmTemplateResult<()> {
        self.record(RemoteCall::CreateSnapshot {
            vm: vm.id.clone(),
            spec: spec.clone(),
        });
        let mut inv = self.inner.lock();
        inv.check(FakeOp::CreateSnapshot)?;
        inv.vm_mut(&vm.id)?.snapshots.push(spec.name.clone());
        Ok(())
    }

    async fn mark_as_template(&self, vm: &VmRef) -> VmTemplateResult<()> {
        self.record(RemoteCall::MarkAsTemplate(vm.id.clone()));
        let mut inv = self.inner.lock();
        inv.check(FakeOp::MarkAsTemplate)?;
        inv.vm_mut(&vm.id)?.template = true;
        Ok(())
    }

    async fn move_into_folder(&self, folder: &FolderRef, vm: &VmRef) -> VmTemplateResult<VmRef> {
        self.record(RemoteCall::MoveIntoFolder {
            vm: vm.id.clone(),
            folder: folder.path.clone(),
        });
        let mut inv = self.inner.lock();
        inv.check(FakeOp::MoveIntoFolder)?;
        if !inv.folders.contains(&folder.path) {
            return Err(VmTemplateError::Remote(format!(
                "folder {} does not exist",
                folder.path
            )));
        }
        let entry = inv.vm_mut(&vm.id)?;
        entry.folder = folder.path.clone();
        Ok(vm_ref(entry))
    }

    async fn placement(&self, vm: &VmRef) -> VmTemplateResult<VmPlacement> {
        self.record(RemoteCall::Placement(vm.id.clone()));
        let mut inv = self.inner.lock();
        let entry = inv.vm_mut(&vm.id)?;
        Ok(VmPlacement {
            vmx_path: entry.vmx_path.clone(),
            host: entry.host.clone(),
            folder: entry.folder.clone(),
        })
    }

    async fn unregister_vm(&self, vm: &VmRef) -> VmTemplateResult<()> {
        self.record(RemoteCall::UnregisterVm(vm.id.clone()));
        let mut inv = self.inner.lock();
        inv.check(FakeOp::UnregisterVm)?;
        inv.vm_mut(&vm.id)?.registered = false;
        Ok(())
    }

    async fn register_vm(
        &self,
        folder: &FolderRef,
        spec: &RegisterSpec,
    ) -> VmTemplateResult<VmRef> {
        self.record(RemoteCall::RegisterVm {
            folder: folder.path.clone(),
            spec: spec.clone(),
        });
        let mut inv = self.inner.lock();
        inv.check(FakeOp::RegisterVm)?;
        if !inv.folders.contains(&folder.path) {
            return Err(VmTemplateError::Remote(format!(
                "folder {} does not exist",
                folder.path
            )));
        }
        let id = inv.allocate_id();
        let vm = FakeVm {
            id,
            name: spec.name.clone(),
            folder: folder.path.clone(),
            vmx_path: spec.vmx_path.clone(),
            host: spec.host.clone(),
            registered: true,
            template: spec.as_template,
            snapshots: Vec::new(),
        };
        let handle = vm_ref(&vm);
        inv.vms.push(vm);
        Ok(handle)
    }

    async fn logout(&self) -> VmTemplateResult<()> {
        self.record(RemoteCall::Logout);
        self.inner.lock().check(FakeOp::Logout)
    }
}

/// Connector handing out [`FakeVsphere`] clients that share one inventory.
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    inventory: FakeVsphere,
}

impl FakeConnector {
    pub fn new(inventory: FakeVsphere) -> Self {
        Self { inventory }
    }

    pub fn inventory(&self) -> &FakeVsphere {
        &self.inventory
    }

    pub fn connect_count(&self) -> usize {
        self.inventory
            .count_calls(|c| matches!(c, RemoteCall::Connect { .. }))
    }
}

#[async_trait]
impl VsphereConnector for FakeConnector {
    async fn connect(&self, endpoint: &Endpoint) -> VmTemplateResult<Arc<dyn VsphereClient>> {
        self.inventory.record(RemoteCall::Connect {
            endpoint: endpoint.redacted(),
            insecure: endpoint.insecure,
        });
        self.inventory
            .inner
            .lock()
            .check(FakeOp::Connect)
            .map_err(|e| VmTemplateError::Connection(e.to_string()))?;
        Ok(Arc::new(self.inventory.clone()))
    }
}
