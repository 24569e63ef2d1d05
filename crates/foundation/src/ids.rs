use serde::{Deserialize, Serialize};

/// Identifier of a located entity, as issued by the external data layer.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub i64);

impl EntityId {
    pub fn new(n: i64) -> Self {
        EntityId(n)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::EntityId;

    #[test]
    fn serializes_as_bare_integer() {
        let json = serde_json::to_string(&EntityId(42)).unwrap();
        assert_eq!(json, "42");
        let back: EntityId = serde_json::from_str("7").unwrap();
        assert_eq!(back, EntityId::new(7));
    }
}
