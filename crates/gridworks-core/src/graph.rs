//! Graph editing: placing, linking, and removing nodes.
//!
//! Every operation validates its request in full before touching the
//! world, so a rejected edit leaves the world unchanged. Rejections are
//! returned as an [`EditFailure`] listing every problem found; only
//! corrupt-world conditions panic.

use crate::fixed::{is_unit_interval, Fixed64};
use crate::geometry::{Direction, Footprint, Position};
use crate::id::{JobId, NodeId, RobotId};
use crate::item::Item;
use crate::job::{Job, JobKind, Robot};
use crate::node::{Node, NodeKind, NodeState, NodeType};
use crate::world::World;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Most cells a single form may cover.
pub const MAX_FORM_CELLS: u64 = 1 << 12;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A single reason an edit was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("node not found [{0}]")]
    UnknownNode(NodeId),
    #[error("position already occupied [{0}]")]
    Occupied(NodeId),
    #[error("{0} nodes are placed with add_form_node")]
    FormPlacementOnly(NodeType),
    #[error("{0} nodes have no rate")]
    RateNotApplicable(NodeType),
    #[error("rate for [{0}] must be within [0, 1]")]
    RateOutOfRange(NodeId),
    #[error("cannot connect node [{0}] to itself")]
    SameNode(NodeId),
    #[error("invalid input [{node}]: {node_type} nodes cannot output items")]
    InvalidInput { node: NodeId, node_type: NodeType },
    #[error("invalid output [{node}]: {node_type} nodes cannot receive items")]
    InvalidOutput { node: NodeId, node_type: NodeType },
    #[error("invalid distance between nodes [{from}] and [{to}]: {distance}, must be 1")]
    InvalidDistance {
        from: NodeId,
        to: NodeId,
        distance: u64,
    },
    #[error("edge already exists [{from} -> {to}]")]
    EdgeExists { from: NodeId, to: NodeId },
    #[error("edge does not exist [{from} -> {to}]")]
    MissingEdge { from: NodeId, to: NodeId },
    #[error("{node_type} node [{node}] cannot be destroyed")]
    NotDestroyable { node: NodeId, node_type: NodeType },
    #[error("form size {width}x{height} must be at least 1x1")]
    EmptyForm { width: u32, height: u32 },
    #[error("form size {width}x{height} is larger than {MAX_FORM_CELLS} cells")]
    FormTooLarge { width: u32, height: u32 },
    #[error("form [{origin}] {width}x{height} does not fit on the grid")]
    FormOutOfBounds {
        origin: NodeId,
        width: u32,
        height: u32,
    },
    #[error("path is empty")]
    EmptyPath,
    #[error("path cells [{0}] and [{1}] are not adjacent")]
    BrokenPath(NodeId, NodeId),
}

/// A rejected edit. Carries every problem found, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", join_messages(.errors))]
pub struct EditFailure {
    pub errors: Vec<EditError>,
}

fn join_messages(errors: &[EditError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl EditFailure {
    fn new(errors: Vec<EditError>) -> Self {
        Self { errors }
    }

    /// Human-readable messages, one per error.
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }

    pub fn contains(&self, error: &EditError) -> bool {
        self.errors.contains(error)
    }
}

impl From<EditError> for EditFailure {
    fn from(error: EditError) -> Self {
        Self::new(vec![error])
    }
}

pub type EditResult<T> = Result<T, EditFailure>;

fn reject(op: &'static str, errors: Vec<EditError>) -> EditFailure {
    let failure = EditFailure::new(errors);
    warn!(op, reason = %failure, "edit rejected");
    failure
}

/// Turn collected errors into a result, logging rejections.
fn finish(op: &'static str, errors: Vec<EditError>) -> EditResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(reject(op, errors))
    }
}

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// Parameters for [`add_node`].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRequest {
    pub position: Position,
    pub node_type: NodeType,
    /// Place as `PendingConstruction` and queue a construction job.
    pub construct: bool,
    /// Overrides the rule default for producers and purifiers.
    pub rate: Option<Fixed64>,
}

impl NodeRequest {
    pub fn new(position: Position, node_type: NodeType) -> Self {
        Self {
            position,
            node_type,
            construct: false,
            rate: None,
        }
    }

    pub fn under_construction(mut self) -> Self {
        self.construct = true;
        self
    }

    pub fn with_rate(mut self, rate: Fixed64) -> Self {
        self.rate = Some(rate);
        self
    }
}

/// What [`add_node`] created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placed {
    pub node: NodeId,
    /// Robot spawned for a terminal.
    pub robot: Option<RobotId>,
    /// Construction job queued for the node.
    pub job: Option<JobId>,
}

/// What [`destroy_node`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum DestroyOutcome {
    /// An active node is now `PendingDestruction` with this job queued.
    Queued(JobId),
    /// A node still under construction was removed outright.
    Cancelled(Removed),
    /// The node was already waiting for destruction.
    AlreadyPending,
}

/// Everything [`delete_node`] took out of the world.
#[derive(Debug, Clone, PartialEq)]
pub struct Removed {
    pub node: Node,
    pub item: Option<Item>,
    /// Nodes that lost their output edge to the removed node.
    pub severed: Vec<NodeId>,
    /// Jobs that targeted the removed node.
    pub jobs: Vec<JobId>,
    /// A terminal's robot goes with it.
    pub robot: Option<RobotId>,
}

/// What [`add_path`] created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathOutcome {
    pub placed: Vec<NodeId>,
    pub linked: Vec<(NodeId, NodeId)>,
}

// ---------------------------------------------------------------------------
// Node placement
// ---------------------------------------------------------------------------

/// Place a single node.
///
/// Producers and purifiers take their rate from the request or the world
/// rules. A robot terminal spawns its robot on the same cell. A request
/// marked `construct` leaves the node `PendingConstruction` and queues a
/// construction job in the same call.
pub fn add_node(world: &mut World, request: NodeRequest) -> EditResult<Placed> {
    let id = NodeId(request.position);
    let node_type = request.node_type;

    let mut errors = Vec::new();
    if world.nodes.contains_key(&id) {
        errors.push(EditError::Occupied(id));
    }
    if matches!(node_type, NodeType::FormRoot | NodeType::FormLeaf) {
        errors.push(EditError::FormPlacementOnly(node_type));
    }
    if let Some(rate) = request.rate {
        if !matches!(node_type, NodeType::Producer | NodeType::Purifier) {
            errors.push(EditError::RateNotApplicable(node_type));
        } else if !is_unit_interval(rate) {
            errors.push(EditError::RateOutOfRange(id));
        }
    }
    finish("add_node", errors)?;

    let mut robot = None;
    let kind = match node_type {
        NodeType::Normal => NodeKind::Normal,
        NodeType::Consumer => NodeKind::Consumer {
            stats: BTreeMap::new(),
        },
        NodeType::Producer => NodeKind::Producer {
            rate: request.rate.unwrap_or(world.rules.producer_rate),
            power: 0,
        },
        NodeType::Purifier => NodeKind::Purifier {
            rate: request.rate.unwrap_or(world.rules.purifier_rate),
        },
        NodeType::Energizer => NodeKind::Energizer { power: 0 },
        NodeType::RobotTerminal => {
            let robot_id = world.allocate_robot_id();
            world.robots.insert(
                robot_id,
                Robot {
                    id: robot_id,
                    home: id,
                    position: request.position,
                    display_delta: None,
                    job: None,
                },
            );
            robot = Some(robot_id);
            NodeKind::RobotTerminal { robot: robot_id }
        }
        NodeType::FormRoot | NodeType::FormLeaf => unreachable!("rejected above"),
    };

    let state = if request.construct {
        NodeState::PendingConstruction
    } else {
        NodeState::Active
    };
    world.nodes.insert(id, Node::new(request.position, state, kind));

    let job = request.construct.then(|| queue_job(world, JobKind::Construct, id));

    debug!(node = %id, %node_type, ?state, "node added");
    Ok(Placed {
        node: id,
        robot,
        job,
    })
}

/// Place a rectangular form: a root at `origin` and leaves on every other
/// covered cell. Nothing is placed unless the whole footprint fits on the
/// grid and every cell is free.
pub fn add_form_node(world: &mut World, origin: Position, size: Footprint) -> EditResult<NodeId> {
    let (width, height) = (size.width, size.height);
    let mut errors = Vec::new();
    if size.is_empty() {
        errors.push(EditError::EmptyForm { width, height });
    }
    if size.area() > MAX_FORM_CELLS {
        errors.push(EditError::FormTooLarge { width, height });
    }
    if size.far_corner(origin).is_err() {
        errors.push(EditError::FormOutOfBounds {
            origin: NodeId(origin),
            width,
            height,
        });
    }
    finish("add_form_node", errors)?;

    let occupied: Vec<EditError> = size
        .tiles(origin)
        .map(NodeId)
        .filter(|id| world.nodes.contains_key(id))
        .map(EditError::Occupied)
        .collect();
    finish("add_form_node", occupied)?;

    for cell in size.tiles(origin) {
        let kind = if cell == origin {
            NodeKind::FormRoot { target: None }
        } else {
            NodeKind::FormLeaf
        };
        let node = Node::new(cell, NodeState::Active, kind);
        world.nodes.insert(node.id, node);
    }

    debug!(root = %NodeId(origin), width = size.width, height = size.height, "form placed");
    Ok(NodeId(origin))
}

/// Lay a conveyor along consecutive cells: free cells get a Normal node
/// and every cell is linked to the next. Pairs that are already linked are
/// left alone. All links are validated before anything is placed.
pub fn add_path(world: &mut World, cells: &[Position], construct: bool) -> EditResult<PathOutcome> {
    if cells.is_empty() {
        return Err(reject("add_path", vec![EditError::EmptyPath]));
    }

    let type_at = |p: &Position| {
        world
            .node_at(*p)
            .map(|n| n.node_type())
            .unwrap_or(NodeType::Normal)
    };

    let mut errors = Vec::new();
    let mut links = Vec::new();
    for pair in cells.windows(2) {
        let (from, to) = (NodeId(pair[0]), NodeId(pair[1]));
        if !pair[0].is_adjacent(&pair[1]) {
            errors.push(EditError::BrokenPath(from, to));
            continue;
        }
        if world.node(from).is_some_and(|n| n.outputs.contains_key(&to)) {
            continue;
        }
        let (from_type, to_type) = (type_at(&pair[0]), type_at(&pair[1]));
        if !from_type.can_output() {
            errors.push(EditError::InvalidInput {
                node: from,
                node_type: from_type,
            });
        }
        if !to_type.can_receive() {
            errors.push(EditError::InvalidOutput {
                node: to,
                node_type: to_type,
            });
        }
        links.push((from, to));
    }
    finish("add_path", errors)?;

    let mut outcome = PathOutcome::default();
    for &cell in cells {
        if world.is_occupied(cell) {
            continue;
        }
        let mut request = NodeRequest::new(cell, NodeType::Normal);
        request.construct = construct;
        outcome.placed.push(add_node(world, request)?.node);
    }
    for (from, to) in links {
        if world.expect_node(from).outputs.contains_key(&to) {
            continue;
        }
        connect(world, from, to)?;
        outcome.linked.push((from, to));
    }

    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

/// Add an output edge from `input` to `output`.
///
/// `input` must be able to hand items on, `output` must be able to receive
/// them, the cells must share an edge, and the edge must not exist yet.
/// All failed checks are reported together.
pub fn connect(world: &mut World, input: NodeId, output: NodeId) -> EditResult<()> {
    let mut errors = Vec::new();

    if input == output {
        errors.push(EditError::SameNode(input));
    }

    let from = world.node(input);
    let to = world.node(output);

    match from {
        None => errors.push(EditError::UnknownNode(input)),
        Some(n) if !n.node_type().can_output() => errors.push(EditError::InvalidInput {
            node: input,
            node_type: n.node_type(),
        }),
        Some(_) => {}
    }
    if input != output {
        match to {
            None => errors.push(EditError::UnknownNode(output)),
            Some(n) if !n.node_type().can_receive() => errors.push(EditError::InvalidOutput {
                node: output,
                node_type: n.node_type(),
            }),
            Some(_) => {}
        }
    }

    if let (Some(from), Some(to)) = (from, to) {
        if input != output {
            let distance = from.position.manhattan_distance(&to.position);
            if distance != 1 {
                errors.push(EditError::InvalidDistance {
                    from: input,
                    to: output,
                    distance,
                });
            }
            if from.outputs.contains_key(&output) {
                errors.push(EditError::EdgeExists {
                    from: input,
                    to: output,
                });
            }
        }
    }

    let direction = match (from, to) {
        (Some(from), Some(to)) => Direction::between(&from.position, &to.position).ok(),
        _ => None,
    };
    finish("connect", errors)?;

    let Some(direction) = direction else {
        unreachable!("adjacency validated above");
    };
    world.expect_node_mut(input).outputs.insert(output, direction);
    debug!(from = %input, to = %output, ?direction, "edge added");
    Ok(())
}

/// Remove the output edge from `input` to `output`.
pub fn disconnect(world: &mut World, input: NodeId, output: NodeId) -> EditResult<()> {
    let Some(from) = world.node_mut(input) else {
        return Err(reject("disconnect", vec![EditError::UnknownNode(input)]));
    };
    if from.outputs.remove(&output).is_none() {
        return Err(reject(
            "disconnect",
            vec![EditError::MissingEdge {
                from: input,
                to: output,
            }],
        ));
    }
    debug!(from = %input, to = %output, "edge removed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Removal
// ---------------------------------------------------------------------------

/// Ask for a node to be removed.
///
/// Forms and robot terminals are permanent. A node still under
/// construction is removed at once and its construction job dropped. An
/// active node becomes `PendingDestruction` and a destruction job is
/// queued; the node stays until a robot reaches it.
pub fn destroy_node(world: &mut World, id: NodeId) -> EditResult<DestroyOutcome> {
    let Some(node) = world.node(id) else {
        return Err(reject("destroy_node", vec![EditError::UnknownNode(id)]));
    };
    let node_type = node.node_type();
    if !node_type.is_destroyable() {
        return Err(reject(
            "destroy_node",
            vec![EditError::NotDestroyable { node: id, node_type }],
        ));
    }

    match node.state {
        NodeState::PendingDestruction => Ok(DestroyOutcome::AlreadyPending),
        NodeState::PendingConstruction => {
            let removed = delete_node(world, id)?;
            debug!(node = %id, jobs = ?removed.jobs, "construction cancelled");
            Ok(DestroyOutcome::Cancelled(removed))
        }
        NodeState::Active => {
            world.expect_node_mut(id).state = NodeState::PendingDestruction;
            let job = queue_job(world, JobKind::Destroy, id);
            Ok(DestroyOutcome::Queued(job))
        }
    }
}

/// Remove a node unconditionally.
///
/// Drops its resident item, every edge pointing at it, any job targeting
/// it (freeing the assigned robot), and, for a terminal, its robot.
pub fn delete_node(world: &mut World, id: NodeId) -> EditResult<Removed> {
    let Some(node) = world.nodes.remove(&id) else {
        return Err(reject("delete_node", vec![EditError::UnknownNode(id)]));
    };

    let item = node.item.and_then(|item_id| world.items.remove(&item_id));

    let mut severed = Vec::new();
    for other in world.nodes.values_mut() {
        if other.outputs.remove(&id).is_some() {
            severed.push(other.id);
        }
        if let NodeKind::FormRoot { target } = &mut other.kind {
            if *target == Some(id) {
                *target = None;
            }
        }
    }

    let jobs: Vec<JobId> = world
        .jobs
        .values()
        .filter(|job| job.node == id)
        .map(|job| job.id)
        .collect();
    for job_id in &jobs {
        if let Some(job) = world.jobs.remove(job_id) {
            if let Some(robot) = job.robot.and_then(|r| world.robots.get_mut(&r)) {
                robot.job = None;
            }
        }
    }

    let robot = match node.kind {
        NodeKind::RobotTerminal { robot } => {
            if let Some(job_id) = world.robots.remove(&robot).and_then(|r| r.job) {
                if let Some(job) = world.jobs.get_mut(&job_id) {
                    job.robot = None;
                }
            }
            Some(robot)
        }
        _ => None,
    };

    debug!(node = %id, severed = severed.len(), "node deleted");
    Ok(Removed {
        node,
        item,
        severed,
        jobs,
        robot,
    })
}

fn queue_job(world: &mut World, kind: JobKind, node: NodeId) -> JobId {
    let id = world.allocate_job_id();
    world.jobs.insert(
        id,
        Job {
            id,
            kind,
            node,
            robot: None,
        },
    );
    debug!(job = %id, ?kind, %node, "job queued");
    id
}
