//! Routing of model reports
//!
//! The model never writes anything itself. It hands `(kind, payload)` pairs to an
//! [`OutputSink`], which decides whether anything happens at all.
//!
//! [`OutputController`] is the standard sink. It keeps a hierarchy of named collections in a
//! graph, with the top level as the implicit root. Each collection has:
//!
//! - a set of enabled [`ReportKind`]s, each with a handler
//! - optionally a collection handler, which receives payloads submitted to the collection as a
//!   whole together with a [`CollectionScope`] for routing further reports inside it
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use arrhenius_core::output::{
//!     DebugReport, OutputController, OutputSink, ReportKind, ReportPayload,
//! };
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//!
//! let mut controller = OutputController::new();
//! let notices = ReportKind::Debug(DebugReport::Notices);
//! let handler = move |_: ReportKind, payload: &ReportPayload| {
//!     sink.lock().unwrap().push(payload.to_string());
//! };
//! controller
//!     .enable_output_type(notices, &[], Some(Arc::new(handler)))
//!     .unwrap();
//!
//! controller.submit_output(notices, &ReportPayload::Text("hello".to_string()));
//! assert_eq!(seen.lock().unwrap().as_slice(), ["hello"]);
//! ```

use crate::errors::{ArrheniusError, ArrheniusResult};
use crate::grid::{CellVariable, LatLongGrid};
use log::{debug, info};
use ndarray::Array2;
use petgraph::graph::NodeIndex;
use petgraph::{Direction, Graph};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name of the collection receiving the final grids of a run
pub const PRIMARY_OUTPUT: &str = "Out";
/// Sub-collection of [`PRIMARY_OUTPUT`] holding per-variable datasets
pub const DATASET_VARS: &str = "DS_Vars";
/// Sub-collection of [`PRIMARY_OUTPUT`] holding rendered images
pub const IMAGES: &str = "Img";

/// Reports derived from comparing a run against a reference dataset
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SpecialReport {
    /// Reference minus modelled temperature change
    DeltaTempDeviations,
    /// Modelled temperature change followed by the deviations
    DeltaTempPlusDeviations,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AccuracyMetric {
    AverageDeviation,
    StandardDeviation,
    Variance,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DebugReport {
    /// Temperature change of one cell
    GridCellDeltaTemp,
    /// Transparency change of one cell
    GridCellDeltaTransparency,
    /// Progress messages
    Notices,
}

/// What a submitted payload represents
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Variable(CellVariable),
    Special(SpecialReport),
    Accuracy(AccuracyMetric),
    Debug(DebugReport),
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportKind::Variable(variable) => variable.name(),
            ReportKind::Special(SpecialReport::DeltaTempDeviations) => "delta_t_deviations",
            ReportKind::Special(SpecialReport::DeltaTempPlusDeviations) => {
                "delta_t_plus_deviations"
            }
            ReportKind::Accuracy(AccuracyMetric::AverageDeviation) => "avg_deviation",
            ReportKind::Accuracy(AccuracyMetric::StandardDeviation) => "std_deviation",
            ReportKind::Accuracy(AccuracyMetric::Variance) => "variance",
            ReportKind::Debug(DebugReport::GridCellDeltaTemp) => "grid_cell_delta_t",
            ReportKind::Debug(DebugReport::GridCellDeltaTransparency) => {
                "grid_cell_delta_transparency"
            }
            ReportKind::Debug(DebugReport::Notices) => "notice",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReportPayload {
    Text(String),
    Scalar(f64),
    /// Rows are latitude bands (south first), columns are time steps
    Table(Array2<f64>),
    /// One grid per time step
    Grids(Vec<LatLongGrid>),
}

impl fmt::Display for ReportPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportPayload::Text(text) => f.write_str(text),
            ReportPayload::Scalar(value) => write!(f, "{}", value),
            ReportPayload::Table(table) => {
                for (i, row) in table.outer_iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    let cells: Vec<String> = row.iter().map(|v| format!("{:.4}", v)).collect();
                    write!(f, "[{}]", cells.join(", "))?;
                }
                Ok(())
            }
            ReportPayload::Grids(grids) => match grids.first() {
                Some(first) => write!(f, "{} grid(s) of {}", grids.len(), first.dimensions()),
                None => f.write_str("no grids"),
            },
        }
    }
}

pub type OutputHandler = Arc<dyn Fn(ReportKind, &ReportPayload) + Send + Sync>;
pub type CollectionHandler =
    Arc<dyn Fn(&CollectionScope<'_>, &ReportPayload) -> ArrheniusResult<()> + Send + Sync>;

/// Receiver of model reports
pub trait OutputSink {
    /// Whether a top-level report of `kind` would be handled
    ///
    /// Lets callers skip building payloads nobody will see.
    fn accepts(&self, _kind: ReportKind) -> bool {
        true
    }

    /// Hand a report to the sink. Reports the sink does not want are dropped.
    fn submit_output(&self, kind: ReportKind, payload: &ReportPayload);

    /// Whether a collection is registered at `path`
    fn has_collection(&self, _path: &[&str]) -> bool {
        true
    }

    /// Hand a payload to the collection at `path`
    fn submit_collection_output(&self, path: &[&str], payload: &ReportPayload)
        -> ArrheniusResult<()>;
}

/// Handler that logs every report at info level
pub fn log_output() -> OutputHandler {
    Arc::new(|kind: ReportKind, payload: &ReportPayload| info!("{}: {}", kind, payload))
}

struct OutputCollection {
    name: String,
    handler: Option<CollectionHandler>,
    outputs: HashMap<ReportKind, OutputHandler>,
}

impl OutputCollection {
    fn new(name: &str, handler: Option<CollectionHandler>) -> Self {
        Self {
            name: name.to_string(),
            handler,
            outputs: HashMap::new(),
        }
    }
}

/// Registry of enabled reports and output collections
pub struct OutputController {
    graph: Graph<OutputCollection, ()>,
    root: NodeIndex,
}

impl Default for OutputController {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OutputController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputController")
            .field("collections", &(self.graph.node_count() - 1))
            .finish()
    }
}

impl OutputController {
    /// A controller with nothing enabled
    pub fn new() -> Self {
        let mut graph = Graph::new();
        let root = graph.add_node(OutputCollection::new("", None));
        Self { graph, root }
    }

    fn child(&self, parent: NodeIndex, name: &str) -> Option<NodeIndex> {
        self.graph
            .neighbors_directed(parent, Direction::Outgoing)
            .find(|node| self.graph[*node].name == name)
    }

    fn resolve_from(&self, start: NodeIndex, path: &[&str]) -> ArrheniusResult<NodeIndex> {
        path.iter().try_fold(start, |node, name| {
            self.child(node, name).ok_or_else(|| {
                ArrheniusError::Output(format!(
                    "no output collection '{}' at '{}'",
                    name,
                    path.join("/")
                ))
            })
        })
    }

    fn resolve(&self, path: &[&str]) -> ArrheniusResult<NodeIndex> {
        self.resolve_from(self.root, path)
    }

    /// Enable reports of `kind` inside the collection at `parents`
    ///
    /// Without a handler the report is logged.
    pub fn enable_output_type(
        &mut self,
        kind: ReportKind,
        parents: &[&str],
        handler: Option<OutputHandler>,
    ) -> ArrheniusResult<()> {
        let node = self.resolve(parents)?;
        self.graph[node]
            .outputs
            .insert(kind, handler.unwrap_or_else(log_output));
        Ok(())
    }

    pub fn disable_output_type(
        &mut self,
        kind: ReportKind,
        parents: &[&str],
    ) -> ArrheniusResult<()> {
        let node = self.resolve(parents)?;
        self.graph[node].outputs.remove(&kind);
        Ok(())
    }

    /// Replace the handler of `kind` if it is already enabled. Returns whether it was.
    pub fn change_handler_if_enabled(
        &mut self,
        kind: ReportKind,
        parents: &[&str],
        handler: OutputHandler,
    ) -> ArrheniusResult<bool> {
        let node = self.resolve(parents)?;
        match self.graph[node].outputs.get_mut(&kind) {
            Some(existing) => {
                *existing = handler;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_enabled(&self, kind: ReportKind, parents: &[&str]) -> bool {
        self.resolve(parents)
            .map(|node| self.graph[node].outputs.contains_key(&kind))
            .unwrap_or(false)
    }

    /// Add a collection named `name` below `parents`
    ///
    /// An existing collection is never replaced, so outputs already enabled in it survive; only
    /// its handler is swapped when a new one is given.
    pub fn register_collection(
        &mut self,
        name: &str,
        parents: &[&str],
        handler: Option<CollectionHandler>,
    ) -> ArrheniusResult<()> {
        let parent = self.resolve(parents)?;
        match self.child(parent, name) {
            Some(existing) => {
                if handler.is_some() {
                    self.graph[existing].handler = handler;
                }
            }
            None => {
                self.add_collection(parent, name, handler);
            }
        }
        Ok(())
    }

    fn add_collection(
        &mut self,
        parent: NodeIndex,
        name: &str,
        handler: Option<CollectionHandler>,
    ) -> NodeIndex {
        let node = self.graph.add_node(OutputCollection::new(name, handler));
        self.graph.add_edge(parent, node, ());
        node
    }

    /// Names of the collections directly below `parents`, in registration order
    pub fn collection_names(&self, parents: &[&str]) -> ArrheniusResult<Vec<String>> {
        let node = self.resolve(parents)?;
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        children.sort();
        Ok(children
            .into_iter()
            .map(|child| self.graph[child].name.clone())
            .collect())
    }

    fn dispatch(&self, node: NodeIndex, kind: ReportKind, payload: &ReportPayload) {
        match self.graph[node].outputs.get(&kind) {
            Some(handler) => handler(kind, payload),
            None => debug!("dropping {} report; not enabled", kind),
        }
    }

    fn scope(&self, node: NodeIndex) -> CollectionScope<'_> {
        CollectionScope {
            controller: self,
            node,
        }
    }

    fn dispatch_collection(&self, node: NodeIndex, payload: &ReportPayload) -> ArrheniusResult<()> {
        let collection = &self.graph[node];
        match &collection.handler {
            Some(handler) => handler(&self.scope(node), payload),
            None => {
                debug!("dropping output for '{}'; no handler", collection.name);
                Ok(())
            }
        }
    }
}

impl OutputSink for OutputController {
    fn accepts(&self, kind: ReportKind) -> bool {
        self.graph[self.root].outputs.contains_key(&kind)
    }

    fn submit_output(&self, kind: ReportKind, payload: &ReportPayload) {
        self.dispatch(self.root, kind, payload);
    }

    fn has_collection(&self, path: &[&str]) -> bool {
        self.resolve(path).is_ok()
    }

    fn submit_collection_output(
        &self,
        path: &[&str],
        payload: &ReportPayload,
    ) -> ArrheniusResult<()> {
        let node = self.resolve(path)?;
        self.dispatch_collection(node, payload)
    }
}

/// View of one collection, handed to its handler
pub struct CollectionScope<'a> {
    controller: &'a OutputController,
    node: NodeIndex,
}

impl<'a> CollectionScope<'a> {
    pub fn name(&self) -> &str {
        &self.controller.graph[self.node].name
    }

    pub fn is_enabled(&self, kind: ReportKind) -> bool {
        self.controller.graph[self.node].outputs.contains_key(&kind)
    }

    pub fn enabled_kinds(&self) -> Vec<ReportKind> {
        self.controller.graph[self.node].outputs.keys().copied().collect()
    }

    /// Sub-collection called `name`, if registered
    pub fn child(&self, name: &str) -> Option<CollectionScope<'a>> {
        self.controller
            .child(self.node, name)
            .map(|node| self.controller.scope(node))
    }

    /// Submit a report handled by this collection's enabled outputs
    pub fn submit_output(&self, kind: ReportKind, payload: &ReportPayload) {
        self.controller.dispatch(self.node, kind, payload);
    }

    /// Submit to a collection below this one
    pub fn submit_collection_output(
        &self,
        path: &[&str],
        payload: &ReportPayload,
    ) -> ArrheniusResult<()> {
        let node = self.controller.resolve_from(self.node, path)?;
        self.controller.dispatch_collection(node, payload)
    }
}

/// Collection handler for [`PRIMARY_OUTPUT`] that logs a summary of the final grids
///
/// For every variable enabled in [`DATASET_VARS`] the global mean of each time step is
/// submitted there as a one-row table.
pub fn log_primary_output() -> CollectionHandler {
    Arc::new(|scope: &CollectionScope<'_>, payload: &ReportPayload| -> ArrheniusResult<()> {
        let ReportPayload::Grids(grids) = payload else {
            info!("{}: {}", scope.name(), payload);
            return Ok(());
        };
        info!("{}: {}", scope.name(), payload);

        if let Some(dataset) = scope.child(DATASET_VARS) {
            for variable in CellVariable::ALL {
                let kind = ReportKind::Variable(variable);
                if dataset.is_enabled(kind) {
                    let means = Array2::from_shape_fn((1, grids.len()), |(_, step)| {
                        grids[step].global_mean(variable)
                    });
                    dataset.submit_output(kind, &ReportPayload::Table(means));
                }
            }
        }
        Ok(())
    })
}

struct StandardLayout {
    controller: OutputController,
    primary: NodeIndex,
    dataset: NodeIndex,
}

impl StandardLayout {
    fn new() -> Self {
        let mut controller = OutputController::new();
        let primary = controller.add_collection(controller.root, PRIMARY_OUTPUT, None);
        let dataset = controller.add_collection(primary, DATASET_VARS, None);
        controller.add_collection(primary, IMAGES, None);
        Self {
            controller,
            primary,
            dataset,
        }
    }

    fn with_defaults() -> Self {
        let mut layout = Self::new();
        layout.controller.graph[layout.primary].handler = Some(log_primary_output());
        for variable in CellVariable::ALL {
            layout.controller.graph[layout.dataset]
                .outputs
                .insert(ReportKind::Variable(variable), log_output());
        }
        layout
    }
}

/// The standard collection layout with nothing enabled and no handlers
pub fn empty_output_config() -> OutputController {
    StandardLayout::new().controller
}

/// Primary output logged, with every variable enabled in the dataset collection
pub fn default_output_config() -> OutputController {
    StandardLayout::with_defaults().controller
}

/// [`default_output_config`] plus progress notices, temperature change and accuracy metrics at
/// the top level
pub fn development_output_config() -> OutputController {
    let StandardLayout {
        mut controller,
        dataset,
        ..
    } = StandardLayout::with_defaults();
    let root = controller.root;
    for kind in [
        ReportKind::Debug(DebugReport::Notices),
        ReportKind::Variable(CellVariable::TemperatureChange),
        ReportKind::Accuracy(AccuracyMetric::AverageDeviation),
        ReportKind::Accuracy(AccuracyMetric::StandardDeviation),
        ReportKind::Accuracy(AccuracyMetric::Variance),
    ] {
        controller.graph[root].outputs.insert(kind, log_output());
    }
    controller.graph[dataset]
        .outputs
        .insert(ReportKind::Debug(DebugReport::Notices), log_output());
    controller
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridCell, GridDimensions};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<(ReportKind, String)>>>;

    fn recorder(log: &Log) -> OutputHandler {
        let log = log.clone();
        Arc::new(move |kind: ReportKind, payload: &ReportPayload| {
            log.lock().unwrap().push((kind, payload.to_string()))
        })
    }

    const NOTICES: ReportKind = ReportKind::Debug(DebugReport::Notices);
    const DELTA: ReportKind = ReportKind::Variable(CellVariable::TemperatureChange);

    #[test]
    fn disabled_outputs_are_ignored() {
        let controller = OutputController::new();
        assert!(!controller.accepts(NOTICES));
        controller.submit_output(NOTICES, &ReportPayload::Text("unheard".to_string()));
    }

    #[test]
    fn enabled_outputs_reach_their_handler() {
        let log: Log = Arc::default();
        let mut controller = OutputController::new();
        controller
            .enable_output_type(NOTICES, &[], Some(recorder(&log)))
            .unwrap();

        assert!(controller.accepts(NOTICES));
        assert!(!controller.accepts(DELTA));
        controller.submit_output(NOTICES, &ReportPayload::Text("one".to_string()));
        controller.submit_output(DELTA, &ReportPayload::Scalar(1.0));

        assert_eq!(*log.lock().unwrap(), vec![(NOTICES, "one".to_string())]);
    }

    #[test]
    fn change_handler_only_when_enabled() {
        let first: Log = Arc::default();
        let second: Log = Arc::default();
        let mut controller = OutputController::new();

        assert!(!controller
            .change_handler_if_enabled(NOTICES, &[], recorder(&second))
            .unwrap());
        assert!(!controller.is_enabled(NOTICES, &[]));

        controller
            .enable_output_type(NOTICES, &[], Some(recorder(&first)))
            .unwrap();
        assert!(controller
            .change_handler_if_enabled(NOTICES, &[], recorder(&second))
            .unwrap());
        controller.submit_output(NOTICES, &ReportPayload::Scalar(2.0));

        assert!(first.lock().unwrap().is_empty());
        assert_eq!(second.lock().unwrap().len(), 1);

        controller.disable_output_type(NOTICES, &[]).unwrap();
        assert!(!controller.accepts(NOTICES));
    }

    #[test]
    fn unknown_collections_are_errors() {
        let mut controller = OutputController::new();
        assert!(controller
            .enable_output_type(NOTICES, &["missing"], None)
            .is_err());
        assert!(controller.register_collection("child", &["missing"], None).is_err());
        assert!(controller
            .submit_collection_output(&["missing"], &ReportPayload::Scalar(0.0))
            .is_err());
    }

    #[test]
    fn collections_without_handlers_drop_output() {
        let controller = empty_output_config();
        assert!(controller
            .submit_collection_output(&[PRIMARY_OUTPUT, IMAGES], &ReportPayload::Scalar(0.0))
            .is_ok());
    }

    #[test]
    fn collections_are_found_by_path() {
        let controller = empty_output_config();
        assert!(controller.has_collection(&[PRIMARY_OUTPUT, DATASET_VARS]));
        assert!(!controller.has_collection(&[DATASET_VARS]));
        assert!(!OutputController::new().has_collection(&[PRIMARY_OUTPUT]));
        assert!(OutputController::new().has_collection(&[]));
    }

    #[test]
    fn standard_layout() {
        let controller = empty_output_config();
        assert_eq!(controller.collection_names(&[]).unwrap(), vec![PRIMARY_OUTPUT]);
        assert_eq!(
            controller.collection_names(&[PRIMARY_OUTPUT]).unwrap(),
            vec![DATASET_VARS, IMAGES]
        );
    }

    #[test]
    fn re_registering_keeps_enabled_outputs() {
        let log: Log = Arc::default();
        let mut controller = empty_output_config();
        controller
            .enable_output_type(DELTA, &[PRIMARY_OUTPUT], Some(recorder(&log)))
            .unwrap();

        let handler: CollectionHandler =
            Arc::new(|scope: &CollectionScope<'_>, payload: &ReportPayload| {
                scope.submit_output(DELTA, payload);
                Ok(())
            });
        controller
            .register_collection(PRIMARY_OUTPUT, &[], Some(handler))
            .unwrap();
        assert_eq!(controller.collection_names(&[]).unwrap().len(), 1);

        controller
            .submit_collection_output(&[PRIMARY_OUTPUT], &ReportPayload::Scalar(3.5))
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec![(DELTA, "3.5".to_string())]);
    }

    #[test]
    fn scopes_route_to_nested_collections() {
        let log: Log = Arc::default();
        let mut controller = empty_output_config();
        let nested = log.clone();
        controller
            .register_collection(
                IMAGES,
                &[PRIMARY_OUTPUT],
                Some(Arc::new(move |scope: &CollectionScope<'_>, payload: &ReportPayload| {
                    nested
                        .lock()
                        .unwrap()
                        .push((NOTICES, format!("{}:{}", scope.name(), payload)));
                    Ok(())
                })),
            )
            .unwrap();
        controller
            .register_collection(
                PRIMARY_OUTPUT,
                &[],
                Some(Arc::new(|scope: &CollectionScope<'_>, payload: &ReportPayload| {
                    scope.submit_collection_output(&[IMAGES], payload)
                })),
            )
            .unwrap();

        controller
            .submit_collection_output(&[PRIMARY_OUTPUT], &ReportPayload::Text("map".to_string()))
            .unwrap();
        assert_eq!(log.lock().unwrap()[0].1, "Img:map");
    }

    #[test]
    fn primary_output_summarises_enabled_variables() {
        let log: Log = Arc::default();
        let mut controller = default_output_config();
        for variable in CellVariable::ALL {
            controller
                .change_handler_if_enabled(
                    ReportKind::Variable(variable),
                    &[PRIMARY_OUTPUT, DATASET_VARS],
                    recorder(&log),
                )
                .unwrap();
        }
        controller
            .disable_output_type(
                ReportKind::Variable(CellVariable::Albedo),
                &[PRIMARY_OUTPUT, DATASET_VARS],
            )
            .unwrap();

        let dims = GridDimensions::from_counts(1, 2).unwrap();
        let grid = LatLongGrid::uniform(dims, GridCell::new(15.0, 50.0, 0.3).unwrap());
        controller
            .submit_collection_output(&[PRIMARY_OUTPUT], &ReportPayload::Grids(vec![grid]))
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert!(log
            .iter()
            .any(|(kind, text)| *kind == ReportKind::Variable(CellVariable::Temperature)
                && text == "[15.0000]"));
    }

    #[test]
    fn development_config_enables_notices() {
        let controller = development_output_config();
        assert!(controller.accepts(NOTICES));
        assert!(controller.accepts(ReportKind::Accuracy(AccuracyMetric::Variance)));
        assert!(controller.is_enabled(NOTICES, &[PRIMARY_OUTPUT, DATASET_VARS]));
        assert!(!controller.accepts(ReportKind::Debug(DebugReport::GridCellDeltaTemp)));
    }

    #[test]
    fn table_payload_display() {
        let payload = ReportPayload::Table(ndarray::array![[1.0, 2.0], [3.0, 4.5]]);
        assert_eq!(payload.to_string(), "[1.0000, 2.0000]\n[3.0000, 4.5000]");
    }
}
