//! Scripted kernel and bridge fixtures shared by the bridge tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use editor_bridge::bridge::CommandBridge;
use editor_bridge::command::FileContent;
use editor_bridge::editor::EditorClient;
use editor_bridge::kernel::{Kernel, KernelError};
use editor_bridge::lifecycle::{self, Binding};
use editor_bridge::origin::OriginValidator;
use editor_bridge::transport::Transport;

pub const EDITOR_ORIGIN: &str = "https://editor.example.com";
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Kernel whose outcomes, gates and panics are scripted per operation name
/// (`write`, `rename`, `unlink`, `install`).
#[derive(Default)]
pub struct ScriptedKernel {
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, KernelError>>,
    gates: Mutex<HashMap<&'static str, Arc<Notify>>>,
    panics: Mutex<Vec<&'static str>>,
    disposed: AtomicBool,
}

impl ScriptedKernel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, op: &'static str, error: KernelError) {
        self.failures.lock().expect("lock").insert(op, error);
    }

    /// Hold `op` until the returned notify is triggered.
    pub fn gate(&self, op: &'static str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates
            .lock()
            .expect("lock")
            .insert(op, Arc::clone(&notify));
        notify
    }

    pub fn panic_on(&self, op: &'static str) {
        self.panics.lock().expect("lock").push(op);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    async fn run(&self, op: &'static str, call: String) -> Result<(), KernelError> {
        self.calls.lock().expect("lock").push(call);
        let gate = self.gates.lock().expect("lock").get(op).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.panics.lock().expect("lock").contains(&op) {
            panic!("scripted panic in {op}");
        }
        match self.failures.lock().expect("lock").get(op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Kernel for ScriptedKernel {
    async fn write_file(&self, path: &str, _content: &FileContent) -> Result<(), KernelError> {
        self.run("write", format!("write {path}")).await
    }

    async fn rename_file(&self, old_path: &str, new_path: &str) -> Result<(), KernelError> {
        self.run("rename", format!("rename {old_path} {new_path}"))
            .await
    }

    async fn unlink(&self, path: &str) -> Result<(), KernelError> {
        self.run("unlink", format!("unlink {path}")).await
    }

    async fn install(&self, requirements: &[String]) -> Result<(), KernelError> {
        self.run("install", format!("install {}", requirements.join(",")))
            .await
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

/// A bound bridge plus an editor client posting as the authorized origin.
pub struct Harness {
    pub kernel: Arc<ScriptedKernel>,
    pub transport: Transport,
    pub binding: Binding,
    pub editor: EditorClient,
}

pub fn harness() -> Harness {
    harness_with_drain(TIMEOUT)
}

pub fn harness_with_drain(drain_timeout: Duration) -> Harness {
    let kernel = ScriptedKernel::new();
    let validator = OriginValidator::exact(EDITOR_ORIGIN).expect("valid origin");
    let bridge = CommandBridge::new(validator, Arc::clone(&kernel) as Arc<dyn Kernel>);
    let transport = Transport::new(16);
    let binding = lifecycle::bind(&transport, bridge, drain_timeout).expect("bind");
    let editor = EditorClient::new(EDITOR_ORIGIN, transport.sender());
    Harness {
        kernel,
        transport,
        binding,
        editor,
    }
}

/// Let spawned tasks make progress.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
