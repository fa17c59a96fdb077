//! Tracked resources and their teardown
//!
//! Every remote session and every spawned session process created by the
//! orchestrator is parked here until `close` drains it. Remote sessions are
//! terminated before local processes are killed, so a killed forwarder never
//! leaves a remote session without a record.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

use et_core::traits::{ControlPlane, SpawnedProcess};
use et_core::{ExecSession, TunnelDescriptor, TunnelError};

/// What a close pass released
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReport {
    /// Remote sessions terminated through the control plane
    pub sessions_terminated: usize,
    /// Remote sessions skipped because they carried no id
    pub sessions_skipped: usize,
    /// Live processes that were signalled
    pub processes_terminated: usize,
    /// Processes that had already exited
    pub processes_exited: usize,
}

/// Owns the processes, remote sessions and tunnel records of one orchestrator
#[derive(Default)]
pub struct ResourceTracker {
    sessions: Mutex<Vec<ExecSession>>,
    processes: Mutex<Vec<Box<dyn SpawnedProcess>>>,
    tunnels: DashMap<u16, TunnelDescriptor>,
}

impl ResourceTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep a remote session for termination on close
    pub fn track_session(&self, session: ExecSession) {
        lock(&self.sessions).push(session);
    }

    /// Keep a spawned process for termination on close
    pub fn track_process(&self, process: Box<dyn SpawnedProcess>) {
        lock(&self.processes).push(process);
    }

    /// Record an established tunnel
    pub fn record_tunnel(&self, descriptor: TunnelDescriptor) {
        self.tunnels.insert(descriptor.local_port, descriptor);
    }

    /// Established tunnels, ordered by local port
    pub fn tunnels(&self) -> Vec<TunnelDescriptor> {
        let mut tunnels: Vec<TunnelDescriptor> =
            self.tunnels.iter().map(|r| r.value().clone()).collect();
        tunnels.sort_by_key(|t| t.local_port);
        tunnels
    }

    /// Number of tracked remote sessions
    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Number of tracked processes, running or not
    pub fn process_count(&self) -> usize {
        lock(&self.processes).len()
    }

    /// Number of tracked processes still running
    pub fn live_processes(&self) -> usize {
        lock(&self.processes)
            .iter_mut()
            .map(|p| p.is_alive())
            .filter(|alive| *alive)
            .count()
    }

    /// Terminate every tracked session and process.
    ///
    /// The pass always runs to the end and leaves the tracker empty; failures
    /// are reported afterwards as [`TunnelError::Close`].
    pub async fn close(
        &self,
        control_plane: &dyn ControlPlane,
    ) -> Result<CloseReport, TunnelError> {
        let mut report = CloseReport::default();
        let mut failures = Vec::new();

        let sessions = drain(&self.sessions);
        if !sessions.is_empty() {
            tracing::debug!("Terminating {} remote session(s)", sessions.len());
        }
        for session in &sessions {
            let Some(id) = session.id() else {
                report.sessions_skipped += 1;
                continue;
            };

            tracing::debug!("Terminating remote session {}", id);
            match control_plane.terminate_session(id).await {
                Ok(()) => report.sessions_terminated += 1,
                Err(e) => {
                    tracing::warn!("Failed to terminate remote session {}: {}", id, e);
                    failures.push(format!("session {}: {}", id, e));
                }
            }
        }

        let processes = drain(&self.processes);
        if !processes.is_empty() {
            tracing::debug!("Stopping {} session process(es)", processes.len());
        }
        for mut process in processes {
            if !process.is_alive() {
                report.processes_exited += 1;
                continue;
            }

            tracing::debug!("Killing session process {:?}", process.pid());
            match process.terminate() {
                Ok(()) => report.processes_terminated += 1,
                Err(e) => {
                    tracing::warn!("Failed to kill session process {:?}: {}", process.pid(), e);
                    failures.push(format!("process {:?}: {}", process.pid(), e));
                }
            }
        }

        self.tunnels.clear();

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(TunnelError::Close { failures })
        }
    }

    /// Release everything without waiting and without failing.
    ///
    /// Remote sessions are terminated on the current Tokio runtime when one
    /// is reachable; otherwise their ids are logged and left behind.
    pub fn close_best_effort(&self, control_plane: &Arc<dyn ControlPlane>) {
        let session_ids: Vec<String> = drain(&self.sessions)
            .into_iter()
            .filter_map(|s| s.session_id.filter(|id| !id.is_empty()))
            .collect();

        if !session_ids.is_empty() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let control_plane = Arc::clone(control_plane);
                    handle.spawn(async move {
                        for id in session_ids {
                            if let Err(e) = control_plane.terminate_session(&id).await {
                                tracing::debug!("Best-effort termination of {} failed: {}", id, e);
                            }
                        }
                    });
                }
                Err(_) => {
                    tracing::warn!(
                        "No runtime available, remote sessions left running: {}",
                        session_ids.join(", ")
                    );
                }
            }
        }

        for mut process in drain(&self.processes) {
            if process.is_alive() {
                if let Err(e) = process.terminate() {
                    tracing::debug!("Best-effort kill of {:?} failed: {}", process.pid(), e);
                }
            }
        }

        self.tunnels.clear();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn drain<T>(mutex: &Mutex<Vec<T>>) -> Vec<T> {
    std::mem::take(&mut *lock(mutex))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use et_core::traits::{ExecuteCommandRequest, TaskDescription};
    use et_core::{ControlPlaneError, TunnelKind};

    #[derive(Default)]
    struct RecordingControlPlane {
        terminated: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl ControlPlane for RecordingControlPlane {
        async fn describe_tasks(
            &self,
            _cluster: &str,
            _task: &str,
        ) -> Result<TaskDescription, ControlPlaneError> {
            Ok(TaskDescription::default())
        }

        async fn execute_command(
            &self,
            _request: ExecuteCommandRequest,
        ) -> Result<ExecSession, ControlPlaneError> {
            Ok(ExecSession::default())
        }

        async fn terminate_session(&self, session_id: &str) -> Result<(), ControlPlaneError> {
            self.terminated.lock().unwrap().push(session_id.to_string());
            if self.fail_on.as_deref() == Some(session_id) {
                return Err(ControlPlaneError::new("TerminateSession", "AccessDenied"));
            }
            Ok(())
        }
    }

    struct StubProcess {
        alive: bool,
        kills: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SpawnedProcess for StubProcess {
        fn pid(&self) -> Option<u32> {
            Some(4242)
        }

        fn write(&mut self, _data: &[u8]) -> io::Result<()> {
            Ok(())
        }

        async fn read_line(&mut self) -> io::Result<Option<String>> {
            Ok(None)
        }

        fn is_alive(&mut self) -> bool {
            self.alive
        }

        fn terminate(&mut self) -> io::Result<()> {
            self.kills.fetch_add(1, Ordering::SeqCst);
            self.alive = false;
            Ok(())
        }
    }

    fn stub(alive: bool, kills: &Arc<AtomicUsize>) -> Box<dyn SpawnedProcess> {
        Box::new(StubProcess {
            alive,
            kills: Arc::clone(kills),
        })
    }

    #[tokio::test]
    async fn test_close_terminates_and_clears() {
        let tracker = ResourceTracker::new();
        let cp = RecordingControlPlane::default();
        let kills = Arc::new(AtomicUsize::new(0));

        tracker.track_session(ExecSession::new("s-1"));
        tracker.track_session(ExecSession::default());
        tracker.track_session(ExecSession {
            session_id: Some(String::new()),
        });
        tracker.track_session(ExecSession::new("s-2"));
        tracker.track_process(stub(true, &kills));
        tracker.track_process(stub(false, &kills));
        tracker.record_tunnel(TunnelDescriptor {
            local_port: 8000,
            remote_port: 80,
            remote_host: None,
            kind: TunnelKind::Direct,
        });

        let report = tracker.close(&cp).await.unwrap();
        assert_eq!(
            report,
            CloseReport {
                sessions_terminated: 2,
                sessions_skipped: 2,
                processes_terminated: 1,
                processes_exited: 1,
            }
        );
        assert_eq!(*cp.terminated.lock().unwrap(), vec!["s-1", "s-2"]);
        assert_eq!(kills.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.session_count(), 0);
        assert_eq!(tracker.process_count(), 0);
        assert!(tracker.tunnels().is_empty());

        // Second pass has nothing left to do
        let report = tracker.close(&cp).await.unwrap();
        assert_eq!(report, CloseReport::default());
        assert_eq!(cp.terminated.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_close_reports_failures_after_full_pass() {
        let tracker = ResourceTracker::new();
        let cp = RecordingControlPlane {
            fail_on: Some("s-1".to_string()),
            ..Default::default()
        };
        let kills = Arc::new(AtomicUsize::new(0));

        tracker.track_session(ExecSession::new("s-1"));
        tracker.track_session(ExecSession::new("s-2"));
        tracker.track_process(stub(true, &kills));

        match tracker.close(&cp).await {
            Err(TunnelError::Close { failures }) => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].contains("s-1"));
            }
            other => panic!("expected close failure, got {:?}", other),
        }

        assert_eq!(cp.terminated.lock().unwrap().len(), 2);
        assert_eq!(kills.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.session_count(), 0);
        assert_eq!(tracker.process_count(), 0);
    }

    #[tokio::test]
    async fn test_best_effort_close_kills_and_schedules_termination() {
        let tracker = ResourceTracker::new();
        let recording = Arc::new(RecordingControlPlane::default());
        let cp: Arc<dyn ControlPlane> = recording.clone();
        let kills = Arc::new(AtomicUsize::new(0));

        tracker.track_session(ExecSession::new("s-9"));
        tracker.track_process(stub(true, &kills));

        tracker.close_best_effort(&cp);
        tracker.close_best_effort(&cp);

        assert_eq!(kills.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.process_count(), 0);
        assert_eq!(tracker.session_count(), 0);

        for _ in 0..50 {
            if !recording.terminated.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(*recording.terminated.lock().unwrap(), vec!["s-9"]);
    }

    #[test]
    fn test_tunnels_sorted_by_local_port() {
        let tracker = ResourceTracker::new();
        for port in [9000u16, 3000, 6000] {
            tracker.record_tunnel(TunnelDescriptor {
                local_port: port,
                remote_port: 80,
                remote_host: None,
                kind: TunnelKind::Direct,
            });
        }
        let ports: Vec<u16> = tracker.tunnels().iter().map(|t| t.local_port).collect();
        assert_eq!(ports, vec![3000, 6000, 9000]);
    }
}
