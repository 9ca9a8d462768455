//! fairmesh CLI - fair a bump out of a procedural mesh.
//!
//! Usage: fairmesh fair [OPTIONS]
//!
//! Run `fairmesh --help` for available commands.

use std::f64::consts::PI;
use std::io::Write;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use nalgebra::Point3;

use fairmesh::algo::fair::{Continuity, FairOptions};
use fairmesh::algo::weights::{LoopWeight, VertexWeight};
use fairmesh::error::MeshError;
use fairmesh::mesh::{build_from_polygons, HalfEdgeMesh, VertexId};
use fairmesh::task::{FairOutcome, FairRequest, FairingTask, SharedMesh};

/// Status poll interval.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "fairmesh")]
#[command(author, version, about = "Mesh fairing CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a mesh with a bump, select the bump and fair it away
    Fair {
        /// Procedural shape to generate
        #[arg(long, value_enum, default_value = "grid")]
        shape: Shape,

        /// Resolution (grid cells per side, or sphere rings)
        #[arg(short = 'n', long, default_value = "32")]
        size: usize,

        /// Continuity at the border of the faired patch
        #[arg(short, long, value_enum, default_value = "tangent")]
        continuity: ContinuityArg,

        /// Vertex weights of the fairing pass
        #[arg(long, value_enum, default_value = "voronoi")]
        vertex_weight: VertexWeightArg,

        /// Loop weights of the fairing pass
        #[arg(long, value_enum, default_value = "cotan")]
        loop_weight: LoopWeightArg,

        /// Triangulate the involved faces first
        #[arg(long)]
        triangulate: bool,

        /// Generate quads instead of triangles
        #[arg(long)]
        quads: bool,

        /// Bump radius as a fraction of the shape (0.0 to 1.0)
        #[arg(short, long, default_value = "0.25")]
        radius: f64,

        /// Conjugate gradient iteration limit per axis
        #[arg(long, default_value = "10000")]
        max_iterations: usize,

        /// Relative residual tolerance
        #[arg(long, default_value = "1e-8")]
        tolerance: f64,

        /// Use single-threaded execution (for benchmarking)
        #[arg(long)]
        sequential: bool,

        /// Cancel the task if it runs longer than this many seconds
        #[arg(long)]
        timeout: Option<f64>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Shape {
    /// Flat square grid
    Grid,
    /// Latitude-longitude unit sphere
    Sphere,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ContinuityArg {
    /// Match positions (harmonic)
    Position,
    /// Match tangent planes (biharmonic)
    Tangent,
    /// Match curvature (triharmonic)
    Curvature,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum VertexWeightArg {
    /// Every vertex weighs 1
    Uniform,
    /// Mixed Voronoi area
    Voronoi,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum LoopWeightArg {
    /// Every edge weighs 1
    Uniform,
    /// Cotangent weights
    Cotan,
}

impl From<ContinuityArg> for Continuity {
    fn from(arg: ContinuityArg) -> Self {
        match arg {
            ContinuityArg::Position => Continuity::Position,
            ContinuityArg::Tangent => Continuity::Tangent,
            ContinuityArg::Curvature => Continuity::Curvature,
        }
    }
}

impl From<VertexWeightArg> for VertexWeight {
    fn from(arg: VertexWeightArg) -> Self {
        match arg {
            VertexWeightArg::Uniform => VertexWeight::Uniform,
            VertexWeightArg::Voronoi => VertexWeight::Voronoi,
        }
    }
}

impl From<LoopWeightArg> for LoopWeight {
    fn from(arg: LoopWeightArg) -> Self {
        match arg {
            LoopWeightArg::Uniform => LoopWeight::Uniform,
            LoopWeightArg::Cotan => LoopWeight::Cotan,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Fair {
            shape,
            size,
            continuity,
            vertex_weight,
            loop_weight,
            triangulate,
            quads,
            radius,
            max_iterations,
            tolerance,
            sequential,
            timeout,
        } => {
            let options = FairOptions::default()
                .with_max_iterations(max_iterations)
                .with_tolerance(tolerance)
                .with_parallel(!sequential);
            options.validate()?;

            let request = FairRequest::new(Vec::new())
                .with_continuity(continuity.into())
                .with_vertex_weight(vertex_weight.into())
                .with_loop_weight(loop_weight.into())
                .with_triangulate(triangulate)
                .with_options(options);

            cmd_fair(shape, size, quads, radius, timeout, request)?;
        }
    }

    Ok(())
}

fn cmd_fair(
    shape: Shape,
    size: usize,
    quads: bool,
    radius: f64,
    timeout: Option<f64>,
    mut request: FairRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    if size < 4 {
        return Err(MeshError::invalid_param("size", size, "must be at least 4").into());
    }
    if !(radius > 0.0 && radius <= 1.0) {
        return Err(MeshError::invalid_param("radius", radius, "must be in (0, 1]").into());
    }
    let timeout = match timeout {
        Some(secs) if !(secs.is_finite() && secs > 0.0) => {
            return Err(MeshError::invalid_param("timeout", secs, "must be positive").into());
        }
        Some(secs) => Some(Duration::from_secs_f64(secs)),
        None => None,
    };

    let (mesh, affected) = match shape {
        Shape::Grid => bumped_grid(size, quads, radius)?,
        Shape::Sphere => bumped_sphere(size, quads, radius)?,
    };
    println!(
        "Generated: {} vertices, {} faces, {} selected",
        mesh.num_vertices(),
        mesh.num_faces(),
        affected.len()
    );

    let before = max_deviation(shape, &mesh, &affected);
    request.affected = affected.clone();

    let mode = if request.options.parallel { "parallel" } else { "sequential" };
    println!(
        "Fairing ({} continuity, {}/{} weights, {})...",
        request.continuity, request.vertex_weight, request.loop_weight, mode
    );

    let shared: SharedMesh = Arc::new(RwLock::new(mesh));
    let start = Instant::now();
    let handle = FairingTask::new(Arc::clone(&shared), request).start();

    while handle.is_running() {
        if timeout.is_some_and(|limit| start.elapsed() > limit) && !handle.is_cancelled() {
            handle.cancel();
        }
        let dots = (start.elapsed().as_millis() / 250 % 4) as usize;
        let line = format!("{}{:<3}", handle.status(), ".".repeat(dots));
        eprint!("\r{:<72}", line);
        let _ = std::io::stderr().flush();
        thread::sleep(POLL_INTERVAL);
    }
    eprint!("\r{:<72}\r", "");
    let outcome = handle.join();
    let elapsed = start.elapsed();

    match outcome {
        FairOutcome::Completed(report) => {
            let mesh = shared.read().unwrap_or_else(|e| e.into_inner());
            let after = max_deviation(shape, &mesh, &affected);
            println!(
                "Faired {} vertices ({} in support, {} nonzeros) in {:.2?}",
                report.free_vertices, report.support_vertices, report.nonzeros, elapsed
            );
            println!(
                "CG iterations: x={} y={} z={} (residual {:.2e})",
                report.iterations[0], report.iterations[1], report.iterations[2], report.residual
            );
            println!("Max deviation: {:.6} -> {:.6}", before, after);
            Ok(())
        }
        FairOutcome::NothingToDo => {
            println!("Nothing to do: no vertices selected");
            Ok(())
        }
        FairOutcome::Cancelled => {
            println!("Cancelled after {:.2?}", elapsed);
            Ok(())
        }
        FairOutcome::Failed(reason) => Err(reason.into()),
    }
}

/// Smooth compact falloff: 1 at the centre, 0 at `t >= 1`.
fn falloff(t: f64) -> f64 {
    if t >= 1.0 {
        0.0
    } else {
        let s = 1.0 - t * t;
        s * s
    }
}

/// Split each quad along its first diagonal unless quads are wanted.
fn push_quad(faces: &mut Vec<Vec<usize>>, quad: [usize; 4], quads: bool) {
    let [a, b, c, d] = quad;
    if quads {
        faces.push(vec![a, b, c, d]);
    } else {
        faces.push(vec![a, b, c]);
        faces.push(vec![a, c, d]);
    }
}

/// Unit-spaced `n x n` grid in the xy-plane with a bump at its centre.
fn bumped_grid(
    n: usize,
    quads: bool,
    radius: f64,
) -> Result<(HalfEdgeMesh, Vec<VertexId>), MeshError> {
    let centre = n as f64 / 2.0;
    let r = radius * centre;
    let height = 0.5 * r;

    let mut vertices = Vec::with_capacity((n + 1) * (n + 1));
    let mut affected = Vec::new();
    for j in 0..=n {
        for i in 0..=n {
            let (x, y) = (i as f64, j as f64);
            let d = ((x - centre).powi(2) + (y - centre).powi(2)).sqrt();
            if d < r {
                affected.push(VertexId::new(vertices.len()));
            }
            vertices.push(Point3::new(x, y, height * falloff(d / r)));
        }
    }

    let mut faces = Vec::with_capacity(n * n * 2);
    for j in 0..n {
        for i in 0..n {
            let v = j * (n + 1) + i;
            push_quad(&mut faces, [v, v + 1, v + n + 2, v + n + 1], quads);
        }
    }

    Ok((build_from_polygons(&vertices, &faces)?, affected))
}

/// Latitude-longitude unit sphere with a bump around +x.
fn bumped_sphere(
    rings: usize,
    quads: bool,
    radius: f64,
) -> Result<(HalfEdgeMesh, Vec<VertexId>), MeshError> {
    let segments = 2 * rings;
    let angle = radius * PI / 2.0;

    let mut vertices = vec![Point3::new(0.0, 0.0, 1.0)];
    for ring in 1..rings {
        let theta = PI * ring as f64 / rings as f64;
        for s in 0..segments {
            let phi = 2.0 * PI * s as f64 / segments as f64;
            vertices.push(Point3::new(
                theta.sin() * phi.cos(),
                theta.sin() * phi.sin(),
                theta.cos(),
            ));
        }
    }
    vertices.push(Point3::new(0.0, 0.0, -1.0));
    let south = vertices.len() - 1;

    let mut affected = Vec::new();
    for (i, p) in vertices.iter_mut().enumerate() {
        let t = p.x.clamp(-1.0, 1.0).acos() / angle;
        if t < 1.0 {
            affected.push(VertexId::new(i));
        }
        *p *= 1.0 + 0.5 * falloff(t);
    }

    let ring_start = |ring: usize| 1 + (ring - 1) * segments;
    let mut faces = Vec::new();
    for s in 0..segments {
        let t = (s + 1) % segments;
        faces.push(vec![0, ring_start(1) + s, ring_start(1) + t]);
    }
    for ring in 1..rings - 1 {
        let (a, b) = (ring_start(ring), ring_start(ring + 1));
        for s in 0..segments {
            let t = (s + 1) % segments;
            push_quad(&mut faces, [a + s, b + s, b + t, a + t], quads);
        }
    }
    let last = ring_start(rings - 1);
    for s in 0..segments {
        let t = (s + 1) % segments;
        faces.push(vec![south, last + t, last + s]);
    }

    Ok((build_from_polygons(&vertices, &faces)?, affected))
}

/// Largest distance of the selected vertices from the unbumped shape.
fn max_deviation(shape: Shape, mesh: &HalfEdgeMesh, affected: &[VertexId]) -> f64 {
    affected
        .iter()
        .map(|&v| {
            let p = mesh.position(v);
            match shape {
                Shape::Grid => p.z.abs(),
                Shape::Sphere => (p.coords.norm() - 1.0).abs(),
            }
        })
        .fold(0.0, f64::max)
}
