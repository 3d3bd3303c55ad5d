use super::{Id, Node, ObjectType, Relation, TypedId, Way};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Add,
    Modify,
    Delete,
}

/// One element of the input event stream. Adds and modifies carry the full
/// primitive; deletes carry only the id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    NodeAdd(Node),
    NodeModify(Node),
    NodeDelete(Id),
    WayAdd(Way),
    WayModify(Way),
    WayDelete(Id),
    RelationAdd(Relation),
    RelationModify(Relation),
    RelationDelete(Id),
}

impl Change {
    pub fn kind(&self) -> ObjectType {
        match self {
            Change::NodeAdd(_) | Change::NodeModify(_) | Change::NodeDelete(_) => ObjectType::Node,
            Change::WayAdd(_) | Change::WayModify(_) | Change::WayDelete(_) => ObjectType::Way,
            Change::RelationAdd(_) | Change::RelationModify(_) | Change::RelationDelete(_) => {
                ObjectType::Relation
            }
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Change::NodeAdd(_) | Change::WayAdd(_) | Change::RelationAdd(_) => Action::Add,
            Change::NodeModify(_) | Change::WayModify(_) | Change::RelationModify(_) => {
                Action::Modify
            }
            Change::NodeDelete(_) | Change::WayDelete(_) | Change::RelationDelete(_) => {
                Action::Delete
            }
        }
    }

    pub fn id(&self) -> Id {
        match self {
            Change::NodeAdd(n) | Change::NodeModify(n) => n.id,
            Change::WayAdd(w) | Change::WayModify(w) => w.id,
            Change::RelationAdd(r) | Change::RelationModify(r) => r.id,
            Change::NodeDelete(id) | Change::WayDelete(id) | Change::RelationDelete(id) => *id,
        }
    }

    pub fn typed_id(&self) -> TypedId {
        TypedId {
            kind: self.kind(),
            id: self.id(),
        }
    }
}
