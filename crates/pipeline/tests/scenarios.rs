// End-to-end dispatcher scenarios over the in-memory sink: import phases,
// geometry failure handling, update propagation, and delete cascades.

use evaluate::{Context, DefineContext, Evaluator, GeometryOptions, Value};
use geometry::{BuilderConfig, Coord, Geometry, Projection};
use middle::{Middle, Mode};
use osm::{Change, Id, Location, Member, Metadata, Node, ObjectType, Relation, TagMap, TypedId, Way};
use pipeline::{configure, run_import, run_update, RunConfig, RunError};
use serde_json::json;
use sink::MemorySink;
use tokio_util::sync::CancellationToken;

/// A small but realistic mapping: amenity nodes into `pois`, highway ways
/// into `highways`, multipolygon relations into `areas`.
struct FlexEvaluator;

impl Evaluator for FlexEvaluator {
    fn configure(&mut self, ctx: &mut DefineContext) -> Result<(), evaluate::Error> {
        ctx.define_table(json!({
            "name": "pois",
            "ids": { "type": "node", "id_column": "osm_id" },
            "columns": [
                { "column": "tags", "type": "jsonb" },
                { "column": "geom", "type": "point", "not_null": true },
            ],
        }))?;
        ctx.define_table(json!({
            "name": "highways",
            "ids": { "type": "way", "id_column": "osm_id" },
            "columns": [
                { "column": "kind", "type": "text" },
                { "column": "geom", "type": "linestring", "not_null": true },
            ],
        }))?;
        ctx.define_table(json!({
            "name": "areas",
            "ids": { "type": "area", "id_column": "osm_id" },
            "columns": [
                { "column": "geom", "type": "multipolygon", "not_null": true },
            ],
        }))?;
        Ok(())
    }

    fn process_node(&mut self, ctx: &mut Context<'_>) -> Result<(), evaluate::Error> {
        if ctx.object().tags.contains("amenity") {
            let tags = Value::Json(ctx.object().tags.to_json());
            let geom = ctx.as_point(&GeometryOptions::default());
            ctx.insert("pois", vec![("tags", tags), ("geom", geom)])?;
        }
        Ok(())
    }

    fn process_way(&mut self, ctx: &mut Context<'_>) -> Result<(), evaluate::Error> {
        let kind = ctx.object().tags.get("highway").map(str::to_string);
        if let Some(kind) = kind {
            let geom = ctx.as_linestring(&GeometryOptions::default());
            ctx.insert(
                "highways",
                vec![("kind", Value::text(kind)), ("geom", geom)],
            )?;
        }
        Ok(())
    }

    fn process_relation(&mut self, ctx: &mut Context<'_>) -> Result<(), evaluate::Error> {
        if ctx.object().tags.get("type") == Some("multipolygon") {
            let geom = ctx.as_multipolygon(&GeometryOptions::default());
            ctx.insert("areas", vec![("geom", geom)])?;
        }
        Ok(())
    }
}

fn config() -> RunConfig {
    RunConfig {
        builder: BuilderConfig {
            projection: Projection::Wgs84,
            ..BuilderConfig::default()
        },
        ..RunConfig::default()
    }
}

fn node(id: Id, tags: &[(&str, &str)], lon: f64, lat: f64) -> Node {
    Node {
        id,
        tags: tags.iter().copied().collect::<TagMap>(),
        location: Location::from_degrees(lon, lat),
        meta: Metadata::default(),
    }
}

fn way(id: Id, tags: &[(&str, &str)], refs: Vec<Id>) -> Way {
    Way {
        id,
        tags: tags.iter().copied().collect::<TagMap>(),
        refs,
        meta: Metadata::default(),
    }
}

fn relation(id: Id, tags: &[(&str, &str)], members: Vec<(Id, &str)>) -> Relation {
    Relation {
        id,
        tags: tags.iter().copied().collect::<TagMap>(),
        members: members
            .into_iter()
            .map(|(id, role)| Member {
                kind: ObjectType::Way,
                id,
                role: role.to_string(),
            })
            .collect(),
        meta: Metadata::default(),
    }
}

struct Harness {
    evaluator: FlexEvaluator,
    schema: schema::Schema,
    config: RunConfig,
    middle: Middle,
    sink: MemorySink,
    cancel: CancellationToken,
}

impl Harness {
    fn new() -> Self {
        let mut evaluator = FlexEvaluator;
        let schema = configure(&mut evaluator).unwrap();
        Self {
            evaluator,
            schema,
            config: config(),
            middle: Middle::new(Mode::Update),
            sink: MemorySink::new(),
            cancel: CancellationToken::new(),
        }
    }

    async fn import(&mut self, events: Vec<Change>) -> Result<pipeline::RunStats, RunError> {
        run_import(
            &mut self.evaluator,
            &self.schema,
            &self.config,
            &mut self.middle,
            &mut self.sink,
            events,
            &self.cancel,
        )
        .await
    }

    async fn update(&mut self, events: Vec<Change>) -> Result<pipeline::RunStats, RunError> {
        run_update(
            &mut self.evaluator,
            &self.schema,
            &self.config,
            &mut self.middle,
            &mut self.sink,
            events,
            &self.cancel,
        )
        .await
    }
}

#[tokio::test]
async fn single_node_single_table() {
    let mut h = Harness::new();
    let stats = h
        .import(vec![Change::NodeAdd(node(
            1,
            &[("amenity", "pub")],
            10.0,
            50.0,
        ))])
        .await
        .unwrap();

    assert_eq!(stats.nodes, 1);
    assert_eq!(stats.eval.rows_emitted, 1);
    assert_eq!(stats.eval.geometry_failures, 0);

    let rows: Vec<_> = h.sink.rows_for_table("pois").collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].object, TypedId::node(1));
    assert_eq!(rows[0].values[0], Value::Int(1));
    assert_eq!(
        rows[0].values[1],
        Value::Json(json!({"amenity": "pub"}))
    );
    assert_eq!(
        rows[0].values[2],
        Value::Geometry(Geometry::Point(Coord { x: 10.0, y: 50.0 }), 4326)
    );
}

#[tokio::test]
async fn way_with_missing_node_fails_geometry_and_emits_nothing() {
    let mut h = Harness::new();
    let stats = h
        .import(vec![
            Change::NodeAdd(node(1, &[], 10.0, 50.0)),
            Change::WayAdd(way(100, &[("highway", "primary")], vec![1, 2])),
        ])
        .await
        .unwrap();

    assert_eq!(stats.eval.geometry_failures, 1);
    assert_eq!(stats.eval.rows_emitted, 0);
    assert_eq!(h.sink.rows_for_table("highways").count(), 0);
}

#[tokio::test]
async fn node_update_triggers_way_rerender_exactly_once() {
    let mut h = Harness::new();
    h.import(vec![
        Change::NodeAdd(node(1, &[("amenity", "pub")], 10.0, 50.0)),
        Change::NodeAdd(node(2, &[], 10.5, 50.5)),
        Change::WayAdd(way(100, &[("highway", "primary")], vec![1, 2])),
    ])
    .await
    .unwrap();
    assert_eq!(h.sink.rows_for_table("highways").count(), 1);

    let stats = h
        .update(vec![Change::NodeModify(node(
            1,
            &[("amenity", "pub")],
            11.0,
            50.0,
        ))])
        .await
        .unwrap();

    assert_eq!(stats.reprocessed, 1, "way 100 reprocessed exactly once");

    let rows: Vec<_> = h
        .sink
        .rows_for_object("highways", TypedId::way(100))
        .collect();
    assert_eq!(rows.len(), 1, "exactly one final row-set for the way");
    match &rows[0].values[2] {
        Value::Geometry(Geometry::LineString(coords), 4326) => {
            assert_eq!(coords[0], Coord { x: 11.0, y: 50.0 });
        }
        other => panic!("expected a linestring, got {other:?}"),
    }

    // The node's own row reflects the move as well.
    let pois: Vec<_> = h.sink.rows_for_object("pois", TypedId::node(1)).collect();
    assert_eq!(pois.len(), 1);
    assert_eq!(
        pois[0].values[2],
        Value::Geometry(Geometry::Point(Coord { x: 11.0, y: 50.0 }), 4326)
    );
}

#[tokio::test]
async fn multipolygon_assembles_outer_halves_and_hole() {
    let mut h = Harness::new();
    let mut events = vec![
        Change::NodeAdd(node(1, &[], 0.0, 0.0)),
        Change::NodeAdd(node(2, &[], 4.0, 0.0)),
        Change::NodeAdd(node(3, &[], 4.0, 4.0)),
        Change::NodeAdd(node(4, &[], 0.0, 4.0)),
        Change::NodeAdd(node(5, &[], 1.0, 1.0)),
        Change::NodeAdd(node(6, &[], 2.0, 1.0)),
        Change::NodeAdd(node(7, &[], 2.0, 2.0)),
        Change::NodeAdd(node(8, &[], 1.0, 2.0)),
    ];
    events.push(Change::WayAdd(way(10, &[], vec![1, 2, 3])));
    events.push(Change::WayAdd(way(11, &[], vec![3, 4, 1])));
    events.push(Change::WayAdd(way(12, &[], vec![5, 6, 7, 8, 5])));
    events.push(Change::RelationAdd(relation(
        900,
        &[("type", "multipolygon")],
        vec![(10, "outer"), (11, "outer"), (12, "inner")],
    )));

    let stats = h.import(events).await.unwrap();
    assert_eq!(stats.eval.geometry_failures, 0);

    let rows: Vec<_> = h.sink.rows_for_table("areas").collect();
    assert_eq!(rows.len(), 1);
    // Area ids: relation ids are negated.
    assert_eq!(rows[0].values[0], Value::Int(-900));
    match &rows[0].values[1] {
        Value::Geometry(Geometry::MultiPolygon(polygons), 4326) => {
            assert_eq!(polygons.len(), 1);
            assert_eq!(polygons[0].rings.len(), 2, "one outer ring, one hole");
        }
        other => panic!("expected a multipolygon, got {other:?}"),
    }
}

#[tokio::test]
async fn delete_cascade_removes_rows_and_rerenders_dependents() {
    let mut h = Harness::new();
    h.import(vec![
        Change::NodeAdd(node(1, &[("amenity", "pub")], 10.0, 50.0)),
        Change::NodeAdd(node(2, &[], 10.5, 50.5)),
        Change::WayAdd(way(100, &[("highway", "primary")], vec![1, 2])),
    ])
    .await
    .unwrap();

    let stats = h.update(vec![Change::NodeDelete(1)]).await.unwrap();

    // No row for the deleted node.
    assert_eq!(h.sink.rows_for_object("pois", TypedId::node(1)).count(), 0);
    // The way was reprocessed, failed geometry construction on the missing
    // node, and emitted nothing.
    assert_eq!(stats.reprocessed, 1);
    assert_eq!(stats.eval.geometry_failures, 1);
    assert_eq!(h.sink.rows_for_object("highways", TypedId::way(100)).count(), 0);
}

#[tokio::test]
async fn import_rejects_modifies_and_type_order_violations() {
    let mut h = Harness::new();
    let err = h
        .import(vec![Change::NodeModify(node(1, &[], 0.0, 0.0))])
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::UnexpectedAction(..)));

    let mut h = Harness::new();
    let err = h
        .import(vec![
            Change::WayAdd(way(100, &[], vec![1, 2])),
            Change::NodeAdd(node(1, &[], 0.0, 0.0)),
        ])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::OutOfOrder(ObjectType::Node, ObjectType::Way)
    ));
}

#[tokio::test]
async fn cancellation_aborts_without_commit() {
    let mut h = Harness::new();
    h.cancel.cancel();
    let err = h
        .import(vec![Change::NodeAdd(node(1, &[("amenity", "pub")], 0.0, 0.0))])
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Cancelled));
    // The staged flush ran, the commit did not.
    assert_eq!(h.sink.flushes(), 1);
}
