//! Loading pipeline: reads a config file, validates it, builds the world.
//!
//! Provides format detection (RON/JSON/TOML), file discovery,
//! deserialization, and the build step that turns a [`GameConfig`] into a
//! [`World`] through the regular graph edits.

use crate::schema::{FormData, GameConfig, NodeData, RulesData};
use gridworks_core::engine::Engine;
use gridworks_core::fixed::{is_unit_interval, Fixed64};
use gridworks_core::geometry::{Footprint, GeometryError};
use gridworks_core::graph::{self, EditFailure, NodeRequest};
use gridworks_core::id::NodeId;
use gridworks_core::node::NodeType;
use gridworks_core::world::{Rules, World};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Base name of a world config inside a data directory.
pub const WORLD_FILE: &str = "world";

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("no {file}.{{ron,toml,json}} in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    #[error("{file}: expected a .ron, .toml or .json file")]
    UnsupportedFormat { file: PathBuf },

    /// More than one format exists for the same base name.
    #[error("ambiguous data files {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    #[error("cannot parse {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A position string is not of the form `"x.y"`.
    #[error("bad position in {context}: {source}")]
    Position {
        context: String,
        #[source]
        source: GeometryError,
    },

    #[error("{field} must be within [0, 1], got {value}")]
    Rate { field: String, value: f64 },

    /// The graph editor rejected part of the layout.
    #[error("cannot {action}: {source}")]
    Layout {
        action: String,
        #[source]
        source: EditFailure,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Formats and discovery
// ===========================================================================

/// Text formats a config may be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

impl Format {
    /// Probe order when searching a directory.
    pub const ALL: [Format; 3] = [Format::Ron, Format::Toml, Format::Json];

    pub fn extension(self) -> &'static str {
        match self {
            Format::Ron => "ron",
            Format::Toml => "toml",
            Format::Json => "json",
        }
    }
}

/// The format implied by the file extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    let ext = path.extension().and_then(|e| e.to_str());
    Format::ALL
        .into_iter()
        .find(|f| Some(f.extension()) == ext)
        .ok_or_else(|| DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        })
}

/// Look for `{base_name}` with any supported extension in `dir`.
///
/// `Ok(None)` when nothing matches; an error when two formats do.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut hits = Format::ALL
        .into_iter()
        .map(|f| dir.join(format!("{base_name}.{}", f.extension())))
        .filter(|p| p.is_file());
    let first = hits.next();
    match (first, hits.next()) {
        (Some(a), Some(b)) => Err(DataLoadError::ConflictingFormats { a, b }),
        (first, _) => Ok(first),
    }
}

/// [`find_data_file`], with a missing file as an error.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_owned(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Parse `content` in the given format. `file` is only used in errors.
pub fn deserialize_str<T: DeserializeOwned>(
    content: &str,
    format: Format,
    file: &Path,
) -> Result<T, DataLoadError> {
    let parsed: Result<T, String> = match format {
        Format::Ron => ron::from_str(content).map_err(|e| e.to_string()),
        Format::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        Format::Toml => toml::from_str(content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|detail| DataLoadError::Parse {
        file: file.to_path_buf(),
        detail,
    })
}

/// Read and parse a file, picking the format from its extension.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let text = std::fs::read_to_string(path)?;
    deserialize_str(&text, format, path)
}

/// Load a world config from a file.
pub fn load_config(path: &Path) -> Result<GameConfig, DataLoadError> {
    let config: GameConfig = deserialize_file(path)?;
    info!(
        file = %path.display(),
        nodes = config.nodes.len(),
        forms = config.forms.len(),
        "world config loaded"
    );
    Ok(config)
}

/// Load `world.{ron,toml,json}` from a data directory.
pub fn load_config_dir(dir: &Path) -> Result<GameConfig, DataLoadError> {
    let path = require_data_file(dir, WORLD_FILE)?;
    load_config(&path)
}

// ===========================================================================
// Building
// ===========================================================================

fn parse_position(text: &str, context: impl FnOnce() -> String) -> Result<NodeId, DataLoadError> {
    text.parse().map_err(|source| DataLoadError::Position {
        context: context(),
        source,
    })
}

fn parse_rate(value: f64, field: impl FnOnce() -> String) -> Result<Fixed64, DataLoadError> {
    match Fixed64::checked_from_num(value) {
        Some(rate) if value.is_finite() && is_unit_interval(rate) => Ok(rate),
        _ => Err(DataLoadError::Rate {
            field: field(),
            value,
        }),
    }
}

fn build_rules(data: &RulesData) -> Result<Rules, DataLoadError> {
    Ok(Rules {
        max_purity: data.max_purity,
        producer_rate: parse_rate(data.producer_rate, || "rules.producer_rate".into())?,
        purifier_rate: parse_rate(data.purifier_rate, || "rules.purifier_rate".into())?,
    })
}

fn place_node(world: &mut World, data: &NodeData) -> Result<(), DataLoadError> {
    let id = parse_position(&data.position, || format!("node {:?}", data.position))?;
    let mut request = NodeRequest::new(id.position(), data.node_type);
    if let Some(rate) = data.rate {
        request = request.with_rate(parse_rate(rate, || format!("rate of node {id}"))?);
    }
    if data.construct {
        request = request.under_construction();
    }
    graph::add_node(world, request).map_err(|source| DataLoadError::Layout {
        action: format!("place {} at {id}", data.node_type),
        source,
    })?;
    Ok(())
}

fn place_form(world: &mut World, data: &FormData) -> Result<(), DataLoadError> {
    let origin = parse_position(&data.origin, || format!("form {:?}", data.origin))?;
    let size = Footprint::new(data.width, data.height);
    graph::add_form_node(world, origin.position(), size).map_err(|source| DataLoadError::Layout {
        action: format!("place {}x{} form at {origin}", data.width, data.height),
        source,
    })?;
    Ok(())
}

fn link_outputs(world: &mut World, data: &NodeData) -> Result<(), DataLoadError> {
    let from = parse_position(&data.position, || format!("node {:?}", data.position))?;
    for output in &data.outputs {
        let to = parse_position(output, || format!("outputs of node {from}"))?;
        graph::connect(world, from, to).map_err(|source| DataLoadError::Layout {
            action: format!("connect {from} -> {to}"),
            source,
        })?;
    }
    Ok(())
}

/// Build the world a config describes.
///
/// Every node is placed before any link is made, so a config may list
/// nodes in any order. Forms come after nodes.
pub fn build_world(config: &GameConfig) -> Result<World, DataLoadError> {
    let mut world = World::new(build_rules(&config.rules)?);
    for node in &config.nodes {
        place_node(&mut world, node)?;
    }
    for form in &config.forms {
        place_form(&mut world, form)?;
    }
    for node in &config.nodes {
        link_outputs(&mut world, node)?;
    }
    debug!(
        nodes = world.nodes.len(),
        robots = world.robots.len(),
        jobs = world.jobs.len(),
        "world built"
    );
    Ok(world)
}

/// Build the world and wrap it in an engine seeded from the config.
pub fn build_engine(config: &GameConfig) -> Result<Engine, DataLoadError> {
    Ok(Engine::new(build_world(config)?, config.seed))
}

// ===========================================================================
// Starter world
// ===========================================================================

/// The default starting layout: a robot terminal, a four-node conveyor loop
/// fed by a producer, and an exit from the loop to a consumer.
pub fn starter_config() -> GameConfig {
    GameConfig {
        seed: 0,
        rules: RulesData::default(),
        nodes: vec![
            NodeData::new("0.-2", NodeType::RobotTerminal),
            NodeData::new("0.0", NodeType::Normal).with_outputs(&["0.1"]),
            NodeData::new("0.1", NodeType::Normal).with_outputs(&["1.1"]),
            NodeData::new("1.1", NodeType::Normal).with_outputs(&["1.0"]),
            NodeData::new("1.0", NodeType::Normal).with_outputs(&["0.0", "2.0"]),
            NodeData::new("-1.0", NodeType::Producer).with_outputs(&["0.0"]),
            NodeData::new("2.0", NodeType::Consumer),
        ],
        forms: Vec::new(),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use gridworks_core::graph::EditError;
    use gridworks_core::node::NodeState;
    use gridworks_core::validation::check_world;
    use std::fs;

    /// Per-test directory under the system temp dir, removed on drop.
    struct Scratch(PathBuf);

    impl Scratch {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir()
                .join(format!("gridworks_loader_{name}_{}", std::process::id()));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn write(&self, file: &str, text: &str) -> PathBuf {
            let path = self.0.join(file);
            fs::write(&path, text).unwrap();
            path
        }
    }

    impl Drop for Scratch {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    // -----------------------------------------------------------------------
    // Formats
    // -----------------------------------------------------------------------

    #[test]
    fn detect_format_by_extension() {
        assert_eq!(detect_format(Path::new("world.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("world.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("world.json")).unwrap(), Format::Json);
    }

    #[test]
    fn other_extensions_are_rejected() {
        for name in ["world.yaml", "world", "world.RON"] {
            let err = detect_format(Path::new(name)).unwrap_err();
            assert!(matches!(err, DataLoadError::UnsupportedFormat { .. }), "{name}");
        }
    }

    // -----------------------------------------------------------------------
    // find_data_file / load_config_dir
    // -----------------------------------------------------------------------

    #[test]
    fn empty_directory_has_no_world() {
        let dir = Scratch::new("empty");
        assert_eq!(find_data_file(&dir.0, WORLD_FILE).unwrap(), None);
        let err = load_config_dir(&dir.0).unwrap_err();
        assert!(matches!(err, DataLoadError::MissingRequired { .. }));
    }

    #[test]
    fn two_formats_conflict() {
        let dir = Scratch::new("conflict");
        let ron = dir.write("world.ron", "()");
        let json = dir.write("world.json", "{}");
        match find_data_file(&dir.0, WORLD_FILE) {
            Err(DataLoadError::ConflictingFormats { a, b }) => {
                assert_eq!((a, b), (ron, json));
            }
            other => panic!("expected a conflict, got {other:?}"),
        }
    }

    #[test]
    fn load_config_dir_reads_toml() {
        let dir = Scratch::new("toml");
        dir.write(
            "world.toml",
            r#"
seed = 12

[[nodes]]
position = "0.0"
type = "Producer"
outputs = ["1.0"]

[[nodes]]
position = "1.0"
type = "Consumer"
"#,
        );

        let config = load_config_dir(&dir.0).unwrap();
        assert_eq!(config.seed, 12);
        let world = build_world(&config).unwrap();
        assert!(world.node(NodeId::new(0, 0)).unwrap().outputs.contains_key(&NodeId::new(1, 0)));
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = Scratch::new("parse");
        let path = dir.write("world.ron", "(nodes: [(position: 3)])");
        let err = load_config(&path).unwrap_err();
        let DataLoadError::Parse { file, .. } = &err else {
            panic!("expected a parse error, got {err}");
        };
        assert_eq!(file, &path);
    }

    // -----------------------------------------------------------------------
    // build_world
    // -----------------------------------------------------------------------

    #[test]
    fn starter_world_layout() {
        let world = build_world(&starter_config()).unwrap();
        assert_eq!(world.nodes.len(), 7);
        assert_eq!(world.robots.len(), 1);
        assert!(world.jobs.is_empty());
        assert!(check_world(&world).is_empty());

        let exit = world.node(NodeId::new(1, 0)).unwrap();
        assert_eq!(
            exit.outputs.keys().copied().collect::<Vec<_>>(),
            vec![NodeId::new(0, 0), NodeId::new(2, 0)]
        );
        assert_eq!(
            world.node(NodeId::new(-1, 0)).unwrap().kind.rate(),
            Some(Fixed64::from_num(0.1))
        );
    }

    #[test]
    fn nodes_may_link_forward() {
        let config = GameConfig {
            seed: 0,
            rules: RulesData::default(),
            nodes: vec![
                NodeData::new("0.0", NodeType::Normal).with_outputs(&["1.0"]),
                NodeData::new("1.0", NodeType::Consumer),
            ],
            forms: vec![FormData {
                origin: "4.4".into(),
                width: 2,
                height: 2,
            }],
        };
        let world = build_world(&config).unwrap();
        assert_eq!(world.nodes.len(), 6);
    }

    #[test]
    fn construct_flag_queues_a_job() {
        let mut node = NodeData::new("3.0", NodeType::Normal);
        node.construct = true;
        let config = GameConfig {
            seed: 0,
            rules: RulesData::default(),
            nodes: vec![node],
            forms: Vec::new(),
        };
        let world = build_world(&config).unwrap();
        assert_eq!(
            world.node(NodeId::new(3, 0)).unwrap().state,
            NodeState::PendingConstruction
        );
        assert_eq!(world.jobs.len(), 1);
    }

    #[test]
    fn malformed_position_names_the_entry() {
        let mut config = starter_config();
        config.nodes[2].outputs = vec!["1,1".into()];
        let err = build_world(&config).unwrap_err();
        let DataLoadError::Position { context, .. } = &err else {
            panic!("expected a position error, got {err}");
        };
        assert_eq!(context, "outputs of node 0.1");
    }

    #[test]
    fn rules_rate_out_of_range() {
        let mut config = starter_config();
        config.rules.producer_rate = 1.5;
        assert!(matches!(
            build_world(&config),
            Err(DataLoadError::Rate { value, .. }) if value == 1.5
        ));

        config.rules.producer_rate = f64::NAN;
        assert!(matches!(build_world(&config), Err(DataLoadError::Rate { .. })));
    }

    #[test]
    fn node_rate_override() {
        let mut config = starter_config();
        config.nodes[5].rate = Some(1.0);
        let world = build_world(&config).unwrap();
        assert_eq!(world.node(NodeId::new(-1, 0)).unwrap().kind.rate(), Some(Fixed64::ONE));

        config.nodes[5].rate = Some(-0.5);
        assert!(matches!(build_world(&config), Err(DataLoadError::Rate { .. })));
    }

    #[test]
    fn invalid_link_is_a_layout_error() {
        let mut config = starter_config();
        config.nodes[6].outputs = vec!["1.0".into()];
        let Err(DataLoadError::Layout { source, .. }) = build_world(&config) else {
            panic!("consumer output should be rejected");
        };
        assert!(source.contains(&EditError::InvalidInput {
            node: NodeId::new(2, 0),
            node_type: NodeType::Consumer,
        }));
    }

    #[test]
    fn duplicate_position_is_a_layout_error() {
        let mut config = starter_config();
        config.nodes.push(NodeData::new("0.0", NodeType::Purifier));
        let err = build_world(&config).unwrap_err();
        assert!(err.to_string().contains("position already occupied [0.0]"), "{err}");
    }

    #[test]
    fn build_engine_uses_config_seed() {
        let mut config = starter_config();
        config.seed = 41;
        let a = build_engine(&config).unwrap();
        let b = Engine::new(build_world(&config).unwrap(), 41);
        assert_eq!(a.rng(), b.rng());
    }
}
