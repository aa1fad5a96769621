//! SQL migration definitions for the wgdigest cache database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: artifacts, manifests",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One generated artifact per (collection, item)
CREATE TABLE IF NOT EXISTS artifacts (
    collection INTEGER NOT NULL,
    item_id    TEXT NOT NULL,
    content    TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (collection, item_id)
);

-- One group manifest per collection, replaced as a whole
CREATE TABLE IF NOT EXISTS manifests (
    collection    INTEGER PRIMARY KEY,
    manifest_json TEXT NOT NULL,
    generated_at  TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_strictly_ascending() {
        let versions: Vec<u32> = all_migrations().iter().map(|m| m.version).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(versions.first(), Some(&1));
    }
}
