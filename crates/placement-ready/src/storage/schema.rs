//! Additive schema evolution.
//!
//! Migrations are applied in version order and each one commits in its own transaction
//! together with the `PRAGMA user_version` stamp, so a column is either fully added and
//! recorded or not touched at all. Column additions check `table_info` first, which lets
//! the guard adopt databases created before versioning existed. Nothing here drops or
//! renames a table or column.

use std::collections::BTreeSet;

use rusqlite::{Connection, Transaction};
use serde::Serialize;
use tracing::{debug, info};

/// One schema change.
#[derive(Debug, Clone, Copy)]
pub enum MigrationStep {
    /// Idempotent SQL (`CREATE ... IF NOT EXISTS`, `INSERT OR IGNORE`).
    Execute(&'static str),
    AddColumn {
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub step: MigrationStep,
}

/// Ordered by version. Append only.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create users",
        step: MigrationStep::Execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password TEXT NOT NULL DEFAULT '',
                email TEXT UNIQUE NOT NULL,
                role TEXT NOT NULL,
                department TEXT
            )",
        ),
    },
    Migration {
        version: 2,
        description: "create eligibility_criteria",
        step: MigrationStep::Execute(
            "CREATE TABLE IF NOT EXISTS eligibility_criteria (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                min_attendance REAL NOT NULL DEFAULT 85.0,
                min_assessment_score REAL NOT NULL DEFAULT 80.0,
                min_cgpa REAL NOT NULL DEFAULT 8.5,
                min_leetcode_problems INTEGER NOT NULL DEFAULT 100,
                min_projects INTEGER NOT NULL DEFAULT 3,
                require_portfolio INTEGER NOT NULL DEFAULT 1
            )",
        ),
    },
    Migration {
        version: 3,
        description: "create student_profiles",
        step: MigrationStep::Execute(
            "CREATE TABLE IF NOT EXISTS student_profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                semester_cgpa REAL,
                domain_specialization TEXT,
                skills TEXT,
                projects TEXT,
                leetcode_problems INTEGER DEFAULT 0,
                github_profile TEXT,
                linkedin_profile TEXT,
                portfolio_link TEXT,
                weekly_assessment_score REAL,
                attendance_percentage REAL,
                is_eligible INTEGER NOT NULL DEFAULT 0,
                is_approved INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (user_id) REFERENCES users (id)
            )",
        ),
    },
    Migration {
        version: 4,
        description: "criteria: leetcode profile requirement",
        step: MigrationStep::AddColumn {
            table: "eligibility_criteria",
            column: "require_leetcode_profile",
            definition: "INTEGER NOT NULL DEFAULT 0",
        },
    },
    Migration {
        version: 5,
        description: "criteria: github profile requirement",
        step: MigrationStep::AddColumn {
            table: "eligibility_criteria",
            column: "require_github_profile",
            definition: "INTEGER NOT NULL DEFAULT 0",
        },
    },
    Migration {
        version: 6,
        description: "criteria: linkedin profile requirement",
        step: MigrationStep::AddColumn {
            table: "eligibility_criteria",
            column: "require_linkedin_profile",
            definition: "INTEGER NOT NULL DEFAULT 0",
        },
    },
    Migration {
        version: 7,
        description: "profiles: project titles",
        step: MigrationStep::AddColumn {
            table: "student_profiles",
            column: "project_titles",
            definition: "TEXT",
        },
    },
    Migration {
        version: 8,
        description: "profiles: project domains",
        step: MigrationStep::AddColumn {
            table: "student_profiles",
            column: "project_domains",
            definition: "TEXT",
        },
    },
    Migration {
        version: 9,
        description: "profiles: project github links",
        step: MigrationStep::AddColumn {
            table: "student_profiles",
            column: "project_github_links",
            definition: "TEXT",
        },
    },
    Migration {
        version: 10,
        description: "profiles: leetcode profile link",
        step: MigrationStep::AddColumn {
            table: "student_profiles",
            column: "leetcode_profile",
            definition: "TEXT",
        },
    },
    Migration {
        version: 11,
        description: "users: specialization",
        step: MigrationStep::AddColumn {
            table: "users",
            column: "specialization",
            definition: "TEXT",
        },
    },
    Migration {
        version: 12,
        description: "seed default eligibility criteria",
        step: MigrationStep::Execute(
            "INSERT OR IGNORE INTO eligibility_criteria
                (id, min_attendance, min_assessment_score, min_cgpa, min_leetcode_problems,
                 min_projects, require_portfolio, require_leetcode_profile,
                 require_github_profile, require_linkedin_profile)
             SELECT 1, 85.0, 80.0, 8.5, 100, 3, 1, 0, 0, 0
             WHERE NOT EXISTS (SELECT 1 FROM eligibility_criteria)",
        ),
    },
    Migration {
        version: 13,
        description: "index profiles by student",
        step: MigrationStep::Execute(
            "CREATE INDEX IF NOT EXISTS idx_student_profiles_user_id
                ON student_profiles (user_id)",
        ),
    },
    Migration {
        version: 14,
        description: "move the active criteria row to the singleton id",
        step: MigrationStep::Execute(
            "UPDATE eligibility_criteria SET id = 1
             WHERE id = (SELECT MIN(id) FROM eligibility_criteria)
               AND NOT EXISTS (SELECT 1 FROM eligibility_criteria WHERE id = 1)",
        ),
    },
];

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("migration {version} ({description}) failed: {source}")]
    Migration {
        version: u32,
        description: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("database schema version {found} is newer than the supported version {supported}")]
    Unsupported { found: u32, supported: u32 },
    #[error("unable to inspect schema: {0}")]
    Inspect(#[from] rusqlite::Error),
}

/// What a guard run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub from_version: u32,
    pub to_version: u32,
    pub applied: Vec<u32>,
    pub columns_added: Vec<String>,
}

impl SchemaReport {
    /// Number of `ALTER TABLE` statements executed.
    pub fn alterations(&self) -> usize {
        self.columns_added.len()
    }

    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.columns_added.is_empty()
    }
}

pub struct SchemaGuard {
    migrations: &'static [Migration],
}

impl Default for SchemaGuard {
    fn default() -> Self {
        Self::new(MIGRATIONS)
    }
}

impl SchemaGuard {
    pub fn new(migrations: &'static [Migration]) -> Self {
        Self { migrations }
    }

    pub fn target_version(&self) -> u32 {
        self.migrations
            .iter()
            .map(|migration| migration.version)
            .max()
            .unwrap_or(0)
    }

    /// Bring the schema up to date. Safe to call on every start.
    pub fn run(&self, conn: &mut Connection) -> Result<SchemaReport, SchemaError> {
        let current = user_version(conn)?;
        let target = self.target_version();
        if current > target {
            return Err(SchemaError::Unsupported {
                found: current,
                supported: target,
            });
        }

        let mut report = SchemaReport {
            from_version: current,
            to_version: current,
            ..SchemaReport::default()
        };

        for migration in self.migrations.iter().filter(|m| m.version > current) {
            let tx = conn.transaction()?;
            let added = apply(&tx, migration).map_err(|source| SchemaError::Migration {
                version: migration.version,
                description: migration.description,
                source,
            })?;
            tx.execute_batch(&format!("PRAGMA user_version = {}", migration.version))?;
            tx.commit()?;

            info!(
                version = migration.version,
                description = migration.description,
                "schema migration applied"
            );
            report.applied.push(migration.version);
            report.to_version = migration.version;
            report.columns_added.extend(added);
        }

        // A stamped version does not prove the columns exist (e.g. a restored backup
        // carrying a newer stamp), so every declared column is checked again.
        for migration in self.migrations {
            if let MigrationStep::AddColumn { .. } = migration.step {
                let tx = conn.transaction()?;
                let added = apply(&tx, migration).map_err(|source| SchemaError::Migration {
                    version: migration.version,
                    description: migration.description,
                    source,
                })?;
                tx.commit()?;
                report.columns_added.extend(added);
            }
        }

        debug!(
            from = report.from_version,
            to = report.to_version,
            alterations = report.alterations(),
            "schema guard finished"
        );
        Ok(report)
    }
}

/// Returns the qualified column name when an `ALTER TABLE` ran.
fn apply(tx: &Transaction<'_>, migration: &Migration) -> Result<Option<String>, rusqlite::Error> {
    match migration.step {
        MigrationStep::Execute(sql) => {
            tx.execute_batch(sql)?;
            Ok(None)
        }
        MigrationStep::AddColumn {
            table,
            column,
            definition,
        } => {
            if table_columns(tx, table)?.contains(column) {
                return Ok(None);
            }
            tx.execute_batch(&format!(
                "ALTER TABLE {table} ADD COLUMN {column} {definition}"
            ))?;
            info!(table, column, "added missing column");
            Ok(Some(format!("{table}.{column}")))
        }
    }
}

pub fn user_version(conn: &Connection) -> Result<u32, rusqlite::Error> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

pub fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(names)
}
