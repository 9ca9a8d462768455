//! Cancellable background fairing.
//!
//! A [`FairingTask`] runs the whole fairing operation on one worker thread:
//! optional triangulation of the involved region, a position pre-fair with
//! uniform weights, then the requested pass. The worker edits a private copy
//! of the mesh and swaps it into the [`SharedMesh`] in a single write, so
//! readers see either the old mesh or the finished one.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, RwLock};
//! use fairmesh::prelude::*;
//! use fairmesh::task::{FairOutcome, FairRequest, FairingTask};
//! use nalgebra::Point3;
//!
//! let mut vertices = Vec::new();
//! for j in 0..5 {
//!     for i in 0..5 {
//!         vertices.push(Point3::new(i as f64, j as f64, 0.0));
//!     }
//! }
//! vertices[12].z = 1.0;
//! let mut faces = Vec::new();
//! for j in 0..4 {
//!     for i in 0..4 {
//!         let v = j * 5 + i;
//!         faces.push(vec![v, v + 1, v + 6, v + 5]);
//!     }
//! }
//! let mesh = Arc::new(RwLock::new(build_from_polygons(&vertices, &faces).unwrap()));
//!
//! let request = FairRequest::new(vec![VertexId::new(12)]).with_continuity(Continuity::Position);
//! let handle = FairingTask::new(Arc::clone(&mesh), request).start();
//! assert!(matches!(handle.join(), FairOutcome::Completed(_)));
//! assert!(mesh.read().unwrap().position(VertexId::new(12)).z.abs() < 1e-6);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use log::{info, warn};

use crate::algo::fair::{try_fair, Continuity, FairOptions, FairReport, PHASE_WEIGHTS};
use crate::algo::region::involved_faces;
use crate::algo::status::{CancelToken, FairingStatus};
use crate::algo::weights::{LoopWeight, VertexWeight};
use crate::error::FairError;
use crate::mesh::{triangulate_faces, HalfEdgeMesh, VertexId};

/// A mesh shared between the host and a fairing worker.
pub type SharedMesh = Arc<RwLock<HalfEdgeMesh>>;

/// Status label while the working copy is made.
pub const STATUS_COPY: &str = "Copying the mesh";
/// Status label while the affected set is checked.
pub const STATUS_AFFECTED: &str = "Determining which vertices are affected";
/// Status label while the involved faces are triangulated.
pub const STATUS_TRIANGULATE: &str = "Triangulating involved faces";
/// Prefix of the solver status during the pre-fair pass.
pub const STATUS_PRE_FAIR: &str = "[Pre-Fairing]";
/// Prefix of the solver status during the requested pass.
pub const STATUS_FAIR: &str = "[Fairing]";
/// Status label while the result is committed.
pub const STATUS_UPDATE: &str = "Updating the mesh";

/// What to fair and how.
#[derive(Debug, Clone)]
pub struct FairRequest {
    /// Vertices whose positions are replaced.
    pub affected: Vec<VertexId>,

    /// Continuity at the border of the patch.
    pub continuity: Continuity,

    /// Vertex weights of the main pass (default: Voronoi).
    pub vertex_weight: VertexWeight,

    /// Loop weights of the main pass (default: cotangent).
    pub loop_weight: LoopWeight,

    /// Triangulate the involved faces before fairing.
    pub triangulate: bool,

    /// Solver options, shared by both passes.
    pub options: FairOptions,
}

impl FairRequest {
    /// Request fairing of `affected` with the default settings.
    pub fn new(affected: Vec<VertexId>) -> Self {
        Self {
            affected,
            continuity: Continuity::default(),
            vertex_weight: VertexWeight::Voronoi,
            loop_weight: LoopWeight::Cotan,
            triangulate: false,
            options: FairOptions::default(),
        }
    }

    /// Set the continuity order.
    pub fn with_continuity(mut self, continuity: Continuity) -> Self {
        self.continuity = continuity;
        self
    }

    /// Set the vertex weight scheme of the main pass.
    pub fn with_vertex_weight(mut self, vertex_weight: VertexWeight) -> Self {
        self.vertex_weight = vertex_weight;
        self
    }

    /// Set the loop weight scheme of the main pass.
    pub fn with_loop_weight(mut self, loop_weight: LoopWeight) -> Self {
        self.loop_weight = loop_weight;
        self
    }

    /// Set whether the involved faces are triangulated first.
    pub fn with_triangulate(mut self, triangulate: bool) -> Self {
        self.triangulate = triangulate;
        self
    }

    /// Set the solver options.
    pub fn with_options(mut self, options: FairOptions) -> Self {
        self.options = options;
        self
    }
}

impl Default for FairRequest {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// How a fairing task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FairOutcome {
    /// The faired mesh was committed.
    Completed(FairReport),
    /// The affected set was empty; nothing was committed.
    NothingToDo,
    /// Cancellation was observed; nothing was committed.
    Cancelled,
    /// A pass failed or the worker panicked; nothing was committed.
    Failed(String),
}

impl FairOutcome {
    /// Whether the shared mesh was updated.
    pub fn is_completed(&self) -> bool {
        matches!(self, FairOutcome::Completed(_))
    }
}

impl fmt::Display for FairOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FairOutcome::Completed(report) => write!(
                f,
                "completed ({} vertices, {} in support)",
                report.free_vertices, report.support_vertices
            ),
            FairOutcome::NothingToDo => f.write_str("nothing to do"),
            FairOutcome::Cancelled => f.write_str("cancelled"),
            FairOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// A fairing operation that has not started yet.
pub struct FairingTask {
    mesh: SharedMesh,
    request: FairRequest,
    cancel: CancelToken,
    status: FairingStatus,
}

impl FairingTask {
    /// Create a task that will fair `mesh` as described by `request`.
    pub fn new(mesh: SharedMesh, request: FairRequest) -> Self {
        Self {
            mesh,
            request,
            cancel: CancelToken::new(),
            status: FairingStatus::new(),
        }
    }

    /// Report progress through `status`, e.g. one with an observer attached.
    pub fn with_status(mut self, status: FairingStatus) -> Self {
        self.status = status;
        self
    }

    /// Use an existing cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The token that cancels this task.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Spawn the worker thread.
    pub fn start(self) -> FairingHandle {
        let cancel = self.cancel.clone();
        let status = self.status.clone();
        let thread = thread::spawn(move || self.run());
        FairingHandle {
            thread,
            cancel,
            status,
        }
    }

    /// Run the whole operation on the current thread.
    pub fn run(self) -> FairOutcome {
        let FairingTask {
            mesh,
            request,
            cancel,
            status,
        } = self;

        let result = Worker {
            request: &request,
            cancel: &cancel,
            status: &status,
        }
        .fair_copy(&mesh);

        match result {
            Ok((work, report)) => {
                if cancel.is_cancelled() {
                    return FairOutcome::Cancelled;
                }
                status.set_phase(STATUS_UPDATE);
                *mesh.write().unwrap_or_else(PoisonError::into_inner) = work;
                info!(
                    "committed fairing of {} vertices",
                    report.free_vertices
                );
                FairOutcome::Completed(report)
            }
            Err(outcome) => outcome,
        }
    }
}

/// Handle to a running fairing task.
pub struct FairingHandle {
    thread: JoinHandle<FairOutcome>,
    cancel: CancelToken,
    status: FairingStatus,
}

impl FairingHandle {
    /// Request cancellation. Safe to call repeatedly and from any thread.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation was requested, or the task gave up on its own.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the worker thread is still running.
    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Current status text, e.g. `"[Fairing] Solving the linear system (1/3)"`.
    pub fn status(&self) -> String {
        self.status.text()
    }

    /// A clone of the task's cancellation token.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the worker and return how it ended.
    pub fn join(self) -> FairOutcome {
        self.thread.join().unwrap_or_else(|_| {
            warn!("Mesh fairing worker panicked");
            FairOutcome::Failed("worker thread panicked".to_string())
        })
    }
}

struct Worker<'a> {
    request: &'a FairRequest,
    cancel: &'a CancelToken,
    status: &'a FairingStatus,
}

impl Worker<'_> {
    /// Produce the faired working copy, or the outcome that stops the task.
    fn fair_copy(&self, shared: &SharedMesh) -> Result<(HalfEdgeMesh, FairReport), FairOutcome> {
        self.status.set_phase(STATUS_COPY);
        let mut work = shared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.check_cancelled()?;

        self.status.set_phase(STATUS_AFFECTED);
        let affected = self.affected_vertices(&work)?;
        self.check_cancelled()?;

        if self.request.triangulate {
            self.status.set_phase(STATUS_TRIANGULATE);
            let faces = involved_faces(&work, &affected, self.request.continuity);
            work = triangulate_faces(&work, &faces).map_err(|e| self.fail("triangulation", e))?;
            self.check_cancelled()?;
        }

        let options = &self.request.options;
        let solver_status = FairingStatus::new();

        self.status.set_phase_with_detail(STATUS_PRE_FAIR, &solver_status);
        let vertex_weights = VertexWeight::Uniform.build_with(&work, options.parallel);
        let loop_weights = LoopWeight::Uniform.build_with(&work, options.parallel);
        try_fair(
            &mut work,
            &affected,
            Continuity::Position,
            &vertex_weights,
            &loop_weights,
            self.cancel,
            &solver_status,
            options,
        )
        .map_err(|e| self.pass_failed("Mesh pre-fairing failed", e))?;

        self.status.set_phase_with_detail(STATUS_FAIR, &solver_status);
        solver_status.set_phase(PHASE_WEIGHTS);
        let vertex_weights = self.request.vertex_weight.build_with(&work, options.parallel);
        let loop_weights = self.request.loop_weight.build_with(&work, options.parallel);
        let report = try_fair(
            &mut work,
            &affected,
            self.request.continuity,
            &vertex_weights,
            &loop_weights,
            self.cancel,
            &solver_status,
            options,
        )
        .map_err(|e| self.pass_failed("Mesh fairing failed", e))?;

        Ok((work, report))
    }

    fn affected_vertices(&self, mesh: &HalfEdgeMesh) -> Result<Vec<VertexId>, FairOutcome> {
        if let Err(e) = self.request.options.validate() {
            return Err(self.fail("options", e));
        }
        if let Some(&vertex) = self.request.affected.iter().find(|&&v| !mesh.contains_vertex(v)) {
            return Err(self.fail("selection", FairError::InvalidVertex { vertex }));
        }

        let mut seen = HashSet::with_capacity(self.request.affected.len());
        let affected: Vec<VertexId> = self
            .request
            .affected
            .iter()
            .copied()
            .filter(|&v| seen.insert(v))
            .collect();

        if affected.is_empty() {
            // No commit means no undo step for the host.
            self.cancel.cancel();
            return Err(FairOutcome::NothingToDo);
        }
        Ok(affected)
    }

    fn check_cancelled(&self) -> Result<(), FairOutcome> {
        if self.cancel.is_cancelled() {
            Err(FairOutcome::Cancelled)
        } else {
            Ok(())
        }
    }

    fn pass_failed(&self, message: &str, error: FairError) -> FairOutcome {
        match error {
            FairError::Cancelled => FairOutcome::Cancelled,
            FairError::NothingToDo => {
                self.cancel.cancel();
                FairOutcome::NothingToDo
            }
            error => {
                warn!("{}: {}", message, error);
                self.cancel.cancel();
                FairOutcome::Failed(error.to_string())
            }
        }
    }

    fn fail(&self, stage: &str, error: impl fmt::Display) -> FairOutcome {
        warn!("Mesh fairing rejected at {}: {}", stage, error);
        self.cancel.cancel();
        FairOutcome::Failed(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::status::StatusSnapshot;
    use crate::mesh::build_from_polygons;
    use nalgebra::Point3;

    /// (n+1) x (n+1) quad grid with the vertices in `bumped` lifted.
    fn quad_grid(n: usize, bumped: &[usize]) -> HalfEdgeMesh {
        let mut vertices = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                vertices.push(Point3::new(i as f64, j as f64, 0.0));
            }
        }
        for &v in bumped {
            vertices[v].z = 1.0;
        }

        let mut faces = Vec::new();
        for j in 0..n {
            for i in 0..n {
                let v = j * (n + 1) + i;
                faces.push(vec![v, v + 1, v + n + 2, v + n + 1]);
            }
        }
        build_from_polygons(&vertices, &faces).unwrap()
    }

    fn centre_block(n: usize) -> Vec<usize> {
        let m = n / 2;
        let mut ids = Vec::new();
        for j in (m - 1)..=(m + 1) {
            for i in (m - 1)..=(m + 1) {
                ids.push(j * (n + 1) + i);
            }
        }
        ids
    }

    fn shared(mesh: HalfEdgeMesh) -> SharedMesh {
        Arc::new(RwLock::new(mesh))
    }

    fn ids(raw: &[usize]) -> Vec<VertexId> {
        raw.iter().map(|&i| VertexId::new(i)).collect()
    }

    #[test]
    fn test_request_defaults() {
        let request = FairRequest::default();
        assert!(request.affected.is_empty());
        assert_eq!(request.continuity, Continuity::Tangent);
        assert_eq!(request.vertex_weight, VertexWeight::Voronoi);
        assert_eq!(request.loop_weight, LoopWeight::Cotan);
        assert!(!request.triangulate);

        let request = request
            .with_continuity(Continuity::Curvature)
            .with_loop_weight(LoopWeight::Uniform)
            .with_triangulate(true);
        assert_eq!(request.continuity, Continuity::Curvature);
        assert_eq!(request.loop_weight, LoopWeight::Uniform);
        assert!(request.triangulate);
    }

    #[test]
    fn test_completed_task_commits() {
        let n = 8;
        let block = centre_block(n);
        let mesh = shared(quad_grid(n, &block));

        let handle = FairingTask::new(Arc::clone(&mesh), FairRequest::new(ids(&block))).start();
        let outcome = handle.join();

        assert!(outcome.is_completed(), "{}", outcome);
        let mesh = mesh.read().unwrap();
        for &v in &block {
            assert!(mesh.position(VertexId::new(v)).z.abs() < 1e-6);
        }
    }

    #[test]
    fn test_cancelled_before_start_leaves_mesh() {
        let n = 6;
        let block = centre_block(n);
        let original = quad_grid(n, &block);
        let mesh = shared(original.clone());

        let task = FairingTask::new(Arc::clone(&mesh), FairRequest::new(ids(&block)));
        task.cancel_token().cancel();
        let handle = task.start();

        assert_eq!(handle.join(), FairOutcome::Cancelled);
        assert_eq!(mesh.read().unwrap().positions(), original.positions());
    }

    #[test]
    fn test_empty_selection_is_nothing_to_do() {
        let mesh = shared(quad_grid(4, &[]));
        let handle = FairingTask::new(Arc::clone(&mesh), FairRequest::new(Vec::new())).start();
        let token = handle.cancel_token();

        assert_eq!(handle.join(), FairOutcome::NothingToDo);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_invalid_selection_fails_without_commit() {
        let original = quad_grid(4, &[12]);
        let mesh = shared(original.clone());

        let outcome = FairingTask::new(
            Arc::clone(&mesh),
            FairRequest::new(vec![VertexId::new(12), VertexId::new(1000)]),
        )
        .run();

        assert!(matches!(outcome, FairOutcome::Failed(_)));
        assert_eq!(mesh.read().unwrap().positions(), original.positions());
    }

    #[test]
    fn test_invalid_options_fail() {
        let mesh = shared(quad_grid(4, &[12]));
        let request = FairRequest::new(ids(&[12]))
            .with_options(FairOptions::default().with_tolerance(-1.0));

        let outcome = FairingTask::new(mesh, request).run();
        assert!(matches!(outcome, FairOutcome::Failed(_)));
    }

    #[test]
    fn test_unconverged_pass_fails_without_commit() {
        let n = 6;
        let block = centre_block(n);
        let original = quad_grid(n, &block);
        let mesh = shared(original.clone());

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let status = FairingStatus::new().with_observer(move |snapshot: &StatusSnapshot| {
            sink.lock().unwrap().push(snapshot.phase.clone());
        });
        let request = FairRequest::new(ids(&block)).with_options(
            FairOptions::default()
                .with_max_iterations(1)
                .with_tolerance(1e-14),
        );

        let handle = FairingTask::new(Arc::clone(&mesh), request)
            .with_status(status)
            .start();
        let token = handle.cancel_token();

        match handle.join() {
            FairOutcome::Failed(reason) => {
                assert!(reason.contains("did not converge"), "{}", reason)
            }
            other => panic!("expected a failed task, got {}", other),
        }
        assert!(token.is_cancelled());

        // The pre-fair pass failed, so neither the main pass nor the commit ran
        let phases = seen.lock().unwrap();
        assert!(phases.iter().any(|p| p == STATUS_PRE_FAIR));
        assert!(!phases.iter().any(|p| p == STATUS_FAIR || p == STATUS_UPDATE));
        assert_eq!(mesh.read().unwrap().positions(), original.positions());
    }

    #[test]
    fn test_handle_cancel_while_running() {
        let n = 6;
        let block = centre_block(n);
        let original = quad_grid(n, &block);
        let mesh = shared(original.clone());

        // Hold the worker in its first phase until the host has cancelled
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let worker_side = Arc::clone(&barrier);
        let status = FairingStatus::new().with_observer(move |snapshot: &StatusSnapshot| {
            if snapshot.phase == STATUS_COPY {
                worker_side.wait();
                worker_side.wait();
            }
        });

        let handle = FairingTask::new(Arc::clone(&mesh), FairRequest::new(ids(&block)))
            .with_status(status)
            .start();
        barrier.wait();
        assert!(handle.is_running());
        handle.cancel();
        assert!(handle.is_cancelled());
        barrier.wait();

        assert_eq!(handle.join(), FairOutcome::Cancelled);
        assert_eq!(mesh.read().unwrap().positions(), original.positions());
    }

    #[test]
    fn test_whole_mesh_selection_fails() {
        let original = quad_grid(4, &[12]);
        let mesh = shared(original.clone());
        let everything: Vec<VertexId> = original.vertex_ids().collect();

        let outcome = FairingTask::new(Arc::clone(&mesh), FairRequest::new(everything)).run();

        assert!(matches!(outcome, FairOutcome::Failed(_)), "{}", outcome);
        assert_eq!(mesh.read().unwrap().positions(), original.positions());
    }

    #[test]
    fn test_triangulate_involved_region() {
        let n = 8;
        let block = centre_block(n);
        let mesh = shared(quad_grid(n, &block));
        let faces_before = mesh.read().unwrap().num_faces();

        let request = FairRequest::new(ids(&block))
            .with_continuity(Continuity::Tangent)
            .with_triangulate(true);
        let outcome = FairingTask::new(Arc::clone(&mesh), request).run();
        assert!(outcome.is_completed(), "{}", outcome);

        let mesh = mesh.read().unwrap();
        assert!(mesh.num_faces() > faces_before);
        assert!(!mesh.is_triangle_mesh(), "faces far from the selection stay quads");
        assert!(mesh.is_valid());
        for &v in &block {
            assert!(mesh.position(VertexId::new(v)).z.abs() < 1e-6);
        }
    }

    #[test]
    fn test_cancel_during_fairing_pass_discards_everything() {
        let n = 6;
        let block = centre_block(n);
        let original = quad_grid(n, &block);
        let mesh = shared(original.clone());

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let status = FairingStatus::new().with_observer(move |snapshot: &StatusSnapshot| {
            if snapshot.phase == STATUS_FAIR {
                trigger.cancel();
            }
        });

        let outcome = FairingTask::new(Arc::clone(&mesh), FairRequest::new(ids(&block)))
            .with_status(status)
            .with_cancel_token(cancel)
            .run();

        assert_eq!(outcome, FairOutcome::Cancelled);
        // The pre-fair pass already ran on the private copy
        assert_eq!(mesh.read().unwrap().positions(), original.positions());
    }

    #[test]
    fn test_status_walks_through_phases() {
        let n = 6;
        let block = centre_block(n);
        let mesh = shared(quad_grid(n, &block));

        let status = FairingStatus::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observed = status.clone().with_observer(move |snapshot: &StatusSnapshot| {
            sink.lock().unwrap().push(snapshot.phase.clone());
        });

        let request = FairRequest::new(ids(&block)).with_triangulate(true);
        let outcome = FairingTask::new(mesh, request).with_status(observed).run();
        assert!(outcome.is_completed());

        let mut phases = seen.lock().unwrap().clone();
        phases.dedup();
        assert_eq!(
            phases,
            vec![
                STATUS_COPY,
                STATUS_AFFECTED,
                STATUS_TRIANGULATE,
                STATUS_PRE_FAIR,
                STATUS_FAIR,
                STATUS_UPDATE
            ]
        );
        assert_eq!(status.text(), STATUS_UPDATE);
    }

    #[test]
    fn test_readers_never_see_partial_results() {
        let n = 10;
        let block = centre_block(n);
        let original = quad_grid(n, &block);
        let mesh = shared(original.clone());

        let handle = FairingTask::new(Arc::clone(&mesh), FairRequest::new(ids(&block))).start();
        let mut snapshots = Vec::new();
        while handle.is_running() {
            snapshots.push(mesh.read().unwrap().positions());
            thread::yield_now();
        }
        assert!(handle.join().is_completed());
        let finished = mesh.read().unwrap().positions();

        for snapshot in snapshots {
            assert!(snapshot == original.positions() || snapshot == finished);
        }
    }
}
