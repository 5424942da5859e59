//! Table and column name resolution
//!
//! Deployments differ in where the club and license tables live (standalone
//! schema vs. shared database with a table prefix), so no query in the core
//! hardcodes a physical table name. Everything funnels through the pure
//! resolvers here before SQL is built.

/// Logical entity handled by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Club,
    License,
    CreationEvent,
}

/// Resolves a logical entity to its physical table name
pub fn resolve_table(entity: Entity) -> &'static str {
    match entity {
        Entity::Club => "clubs",
        Entity::License => "licenses",
        Entity::CreationEvent => "creation_events",
    }
}

/// Resolves a logical column key to its physical column name
///
/// Returns `None` for keys the entity does not carry, so callers can skip
/// optional predicates (mirroring deployments where a column is absent).
pub fn resolve_column(entity: Entity, logical: &str) -> Option<&'static str> {
    match (entity, logical) {
        (Entity::Club, "id") => Some("id"),
        (Entity::Club, "owner") => Some("responsible_id"),
        (Entity::Club, "quota") => Some("license_quota"),
        (Entity::Club, "status") => Some("status"),

        (Entity::License, "id") => Some("id"),
        (Entity::License, "club") => Some("club_id"),
        (Entity::License, "status") => Some("raw_status"),
        (Entity::License, "deleted") => Some("deleted_at"),

        (Entity::CreationEvent, "key") => Some("event_key"),
        (Entity::CreationEvent, "status") => Some("status"),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_table() {
        assert_eq!(resolve_table(Entity::Club), "clubs");
        assert_eq!(resolve_table(Entity::License), "licenses");
        assert_eq!(resolve_table(Entity::CreationEvent), "creation_events");
    }

    #[test]
    fn test_resolve_known_columns() {
        assert_eq!(resolve_column(Entity::Club, "owner"), Some("responsible_id"));
        assert_eq!(resolve_column(Entity::License, "deleted"), Some("deleted_at"));
        assert_eq!(resolve_column(Entity::License, "status"), Some("raw_status"));
    }

    #[test]
    fn test_unknown_column_is_none() {
        assert_eq!(resolve_column(Entity::Club, "shoe_size"), None);
        assert_eq!(resolve_column(Entity::CreationEvent, "club"), None);
    }
}
