use super::expand::{expand_relation, expand_way};
use super::RunError;
use evaluate::{Context, Evaluator, EvalStats, Expanded, ObjectView, RowOutput};
use geometry::BuilderConfig;
use middle::Middle;
use osm::{Action, Change, Id, Metadata, Node, ObjectType, Relation, TypedId, Way};
use schema::Schema;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub builder: BuilderConfig,
    /// Dispatch untagged nodes to the evaluator. Off by default: the bulk
    /// of nodes carry no tags and exist only as way geometry.
    pub process_untagged_nodes: bool,
    /// Expose object attribution (version, timestamp, user) to user logic.
    pub extra_attributes: bool,
    /// Bound on transitive relation-of-relation propagation.
    pub relation_depth: u32,
    /// Events / propagation targets handled between flush and cancellation
    /// checks.
    pub batch_size: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            builder: BuilderConfig::default(),
            process_untagged_nodes: false,
            extra_attributes: false,
            relation_depth: 2,
            batch_size: 4096,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub nodes: u64,
    pub ways: u64,
    pub relations: u64,
    /// Dependents re-rendered during the propagation phase.
    pub reprocessed: u64,
    pub eval: EvalStats,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    ImportStart,
    ImportNodes,
    ImportWays,
    ImportRelations,
    UpdateApply,
    UpdatePropagate,
    Stop,
}

/// One run's dispatcher. It owns the run statistics and the update-phase
/// bookkeeping (touched ids, visited set); the evaluator, middle, and sink
/// are borrowed for the run's duration.
pub struct Dispatcher<'r, E> {
    evaluator: &'r mut E,
    schema: &'r Schema,
    config: &'r RunConfig,
    middle: &'r mut Middle,
    phase: Phase,
    stats: RunStats,
    touched_nodes: BTreeSet<Id>,
    touched_ways: BTreeSet<Id>,
    touched_relations: BTreeSet<Id>,
    /// (type, id) pairs already evaluated in this run; propagation skips
    /// them so every dependent is reprocessed at most once.
    visited: BTreeSet<TypedId>,
}

static NO_META: Metadata = Metadata {
    version: None,
    timestamp: None,
    changeset: None,
    uid: None,
    user: None,
};

impl<'r, E: Evaluator> Dispatcher<'r, E> {
    pub fn import(
        evaluator: &'r mut E,
        schema: &'r Schema,
        config: &'r RunConfig,
        middle: &'r mut Middle,
    ) -> Self {
        Self::new(evaluator, schema, config, middle, Phase::ImportStart)
    }

    pub fn update(
        evaluator: &'r mut E,
        schema: &'r Schema,
        config: &'r RunConfig,
        middle: &'r mut Middle,
    ) -> Self {
        Self::new(evaluator, schema, config, middle, Phase::UpdateApply)
    }

    fn new(
        evaluator: &'r mut E,
        schema: &'r Schema,
        config: &'r RunConfig,
        middle: &'r mut Middle,
        phase: Phase,
    ) -> Self {
        Self {
            evaluator,
            schema,
            config,
            middle,
            phase,
            stats: RunStats::default(),
            touched_nodes: BTreeSet::new(),
            touched_ways: BTreeSet::new(),
            touched_relations: BTreeSet::new(),
            visited: BTreeSet::new(),
        }
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Feed one change event. In import runs this drives the phase machine
    /// forward; in update runs it applies the change and records what must
    /// propagate.
    pub fn apply(&mut self, change: &Change, output: &mut dyn RowOutput) -> Result<(), RunError> {
        match self.phase {
            Phase::ImportStart | Phase::ImportNodes | Phase::ImportWays
            | Phase::ImportRelations => self.apply_import(change, output),
            Phase::UpdateApply => self.apply_update(change, output),
            Phase::UpdatePropagate | Phase::Stop => Err(RunError::PhaseViolation),
        }
    }

    fn apply_import(
        &mut self,
        change: &Change,
        output: &mut dyn RowOutput,
    ) -> Result<(), RunError> {
        if change.action() != Action::Add {
            return Err(RunError::UnexpectedAction(change.action(), change.typed_id()));
        }

        let target = match change.kind() {
            ObjectType::Node => Phase::ImportNodes,
            ObjectType::Way => Phase::ImportWays,
            ObjectType::Relation => Phase::ImportRelations,
        };
        // Transitions are strictly monotonic in primitive-type order.
        if target < self.phase {
            return Err(RunError::OutOfOrder(change.kind(), self.current_kind()));
        }
        if target > self.phase {
            tracing::info!(phase = ?change.kind(), "entering import phase");
            self.phase = target;
        }

        match change {
            Change::NodeAdd(node) => {
                self.middle.put_node(node);
                self.stats.nodes += 1;
                if !node.tags.is_empty() || self.config.process_untagged_nodes {
                    self.eval_node(node, output)?;
                }
            }
            Change::WayAdd(way) => {
                self.middle.put_way(way);
                self.stats.ways += 1;
                self.eval_way(way, output)?;
            }
            Change::RelationAdd(relation) => {
                self.middle.put_relation(relation);
                self.stats.relations += 1;
                self.eval_relation(relation, output)?;
            }
            _ => unreachable!("non-add actions rejected above"),
        }
        Ok(())
    }

    fn apply_update(
        &mut self,
        change: &Change,
        output: &mut dyn RowOutput,
    ) -> Result<(), RunError> {
        let id = change.typed_id();

        // Whatever rows this object produced before are gone; a new
        // emission follows for adds and modifies.
        output.delete_object(id).map_err(RunError::Output)?;
        self.visited.insert(id);

        match change {
            Change::NodeAdd(node) | Change::NodeModify(node) => {
                self.middle.put_node(node);
                self.touched_nodes.insert(node.id);
                self.stats.nodes += 1;
                if !node.tags.is_empty() || self.config.process_untagged_nodes {
                    self.eval_node(node, output)?;
                }
            }
            Change::NodeDelete(id) => {
                self.middle.delete_node(*id);
                self.touched_nodes.insert(*id);
                self.stats.nodes += 1;
            }
            Change::WayAdd(way) | Change::WayModify(way) => {
                self.middle.put_way(way);
                self.touched_ways.insert(way.id);
                self.stats.ways += 1;
                self.eval_way(way, output)?;
            }
            Change::WayDelete(id) => {
                self.middle.delete_way(*id);
                self.touched_ways.insert(*id);
                self.stats.ways += 1;
            }
            Change::RelationAdd(relation) | Change::RelationModify(relation) => {
                self.middle.put_relation(relation);
                self.touched_relations.insert(relation.id);
                self.stats.relations += 1;
                self.eval_relation(relation, output)?;
            }
            Change::RelationDelete(id) => {
                self.middle.delete_relation(*id);
                self.touched_relations.insert(*id);
                self.stats.relations += 1;
            }
        }
        Ok(())
    }

    /// Compute the dependents of everything touched during Apply, walking
    /// node → way, node / way → relation, and relation → relation edges up
    /// to the configured depth. Objects already evaluated in this run are
    /// excluded; the result is deduplicated and ordered (ways first).
    pub fn propagation_targets(&mut self) -> Result<Vec<TypedId>, RunError> {
        if self.phase != Phase::UpdateApply {
            return Err(RunError::PhaseViolation);
        }
        self.phase = Phase::UpdatePropagate;
        tracing::info!(
            nodes = self.touched_nodes.len(),
            ways = self.touched_ways.len(),
            relations = self.touched_relations.len(),
            "entering propagation phase"
        );

        let mut dirty_ways = BTreeSet::new();
        for &node in &self.touched_nodes {
            dirty_ways.extend(self.middle.ways_using_node(node));
        }

        let mut dirty_relations = BTreeSet::new();
        for &node in &self.touched_nodes {
            dirty_relations.extend(self.middle.relations_using_node(node));
        }
        for &way in self.touched_ways.iter().chain(dirty_ways.iter()) {
            dirty_relations.extend(self.middle.relations_using_way(way));
        }

        // Relation-of-relation cases chase upward a bounded number of
        // levels; the visited set breaks cycles.
        let mut frontier: BTreeSet<Id> = dirty_relations
            .iter()
            .copied()
            .chain(self.touched_relations.iter().copied())
            .collect();
        for _ in 1..self.config.relation_depth {
            let mut next = BTreeSet::new();
            for &relation in &frontier {
                for parent in self.middle.relations_using_relation(relation) {
                    if dirty_relations.insert(parent) {
                        next.insert(parent);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        Ok(dirty_ways
            .into_iter()
            .map(TypedId::way)
            .chain(dirty_relations.into_iter().map(TypedId::relation))
            .filter(|id| !self.visited.contains(id))
            .collect())
    }

    /// Re-render one dependent: drop its old rows, then re-evaluate it if
    /// it still exists.
    pub fn reprocess(
        &mut self,
        target: TypedId,
        output: &mut dyn RowOutput,
    ) -> Result<(), RunError> {
        if self.phase != Phase::UpdatePropagate {
            return Err(RunError::PhaseViolation);
        }
        if !self.visited.insert(target) {
            return Ok(());
        }
        output.delete_object(target).map_err(RunError::Output)?;

        match target.kind {
            ObjectType::Way => {
                if let Some(way) = self.middle.get_way(target.id) {
                    self.stats.reprocessed += 1;
                    self.eval_way(&way, output)?;
                }
            }
            ObjectType::Relation => {
                if let Some(relation) = self.middle.get_relation(target.id) {
                    self.stats.reprocessed += 1;
                    self.eval_relation(&relation, output)?;
                }
            }
            ObjectType::Node => {}
        }
        Ok(())
    }

    pub fn finish(mut self) -> RunStats {
        self.phase = Phase::Stop;
        self.stats
    }

    // --- evaluation plumbing ---

    fn eval_node(&mut self, node: &Node, output: &mut dyn RowOutput) -> Result<(), RunError> {
        let expanded = Expanded::Node {
            location: node.location,
        };
        let view = ObjectView {
            id: TypedId::node(node.id),
            tags: &node.tags,
            meta: self.meta_of(&node.meta),
            expanded: &expanded,
        };
        let mut ctx = Context::new(
            view,
            self.schema,
            &self.config.builder,
            output,
            &mut self.stats.eval,
        );
        self.evaluator.process_node(&mut ctx)?;
        Ok(())
    }

    fn eval_way(&mut self, way: &Way, output: &mut dyn RowOutput) -> Result<(), RunError> {
        let expanded = expand_way(self.middle, way);
        let view = ObjectView {
            id: TypedId::way(way.id),
            tags: &way.tags,
            meta: self.meta_of(&way.meta),
            expanded: &expanded,
        };
        let mut ctx = Context::new(
            view,
            self.schema,
            &self.config.builder,
            output,
            &mut self.stats.eval,
        );
        self.evaluator.process_way(&mut ctx)?;
        Ok(())
    }

    fn eval_relation(
        &mut self,
        relation: &Relation,
        output: &mut dyn RowOutput,
    ) -> Result<(), RunError> {
        let expanded = expand_relation(self.middle, relation);
        let view = ObjectView {
            id: TypedId::relation(relation.id),
            tags: &relation.tags,
            meta: self.meta_of(&relation.meta),
            expanded: &expanded,
        };
        let mut ctx = Context::new(
            view,
            self.schema,
            &self.config.builder,
            output,
            &mut self.stats.eval,
        );
        self.evaluator.process_relation(&mut ctx)?;
        Ok(())
    }

    fn meta_of<'m>(&self, meta: &'m Metadata) -> &'m Metadata {
        if self.config.extra_attributes {
            meta
        } else {
            &NO_META
        }
    }

    fn current_kind(&self) -> ObjectType {
        match self.phase {
            Phase::ImportWays => ObjectType::Way,
            Phase::ImportRelations => ObjectType::Relation,
            _ => ObjectType::Node,
        }
    }
}
