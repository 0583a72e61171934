//! Row-level-security query rewriting.

use crate::error::{Result, RlsError};
use crate::frontend::{ColumnSource, SqlFrontend, SqlparserFrontend};
use std::sync::Arc;
use tessera_access::AccessController;
use tessera_metadata::ObjectMetadata;
use tessera_types::{Operation, UserSession, system};
use tracing::{debug, info, warn};

/// Rewrites ad-hoc read queries so they respect the access-control layer.
///
/// **Pipeline:**
/// 1. Parse; reject anything but exactly one read-only statement
/// 2. Check object-level read on every table reference
/// 3. Check field visibility on every column reference, resolved in the
///    scope of the query it appears in
/// 4. For non-super-users, conjoin `owner_id = '<actor>'` into the filter
///    when the single target table has an owner field
/// 5. Serialize
///
/// The predicate only covers the top-level table. When an owned table is
/// read anywhere else (joins, subqueries, CTEs) the query passes through
/// with those reads unfiltered, unless
/// [`RowLevelSecurity::reject_unresolved_sources`] is set, in which case it
/// is rejected.
pub struct RowLevelSecurity<F: SqlFrontend = SqlparserFrontend> {
    access: Arc<AccessController>,
    frontend: F,
    reject_unresolved: bool,
}

impl RowLevelSecurity<SqlparserFrontend> {
    pub fn new(access: Arc<AccessController>) -> Self {
        Self {
            access,
            frontend: SqlparserFrontend::default(),
            reject_unresolved: false,
        }
    }
}

impl<F: SqlFrontend> RowLevelSecurity<F> {
    /// Swaps the SQL frontend.
    pub fn with_frontend<G: SqlFrontend>(self, frontend: G) -> RowLevelSecurity<G> {
        RowLevelSecurity {
            access: self.access,
            frontend,
            reject_unresolved: self.reject_unresolved,
        }
    }

    /// Rejects queries whose source is not a single named table instead of
    /// passing them through without an ownership predicate.
    pub fn reject_unresolved_sources(mut self, reject: bool) -> Self {
        self.reject_unresolved = reject;
        self
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    /// Validates `sql` for `actor` and returns the text to execute.
    pub fn rewrite(&self, sql: &str, actor: Option<&UserSession>) -> Result<String> {
        let mut statements = self.frontend.parse(sql)?;
        let mut statement = match statements.len() {
            0 => return Err(RlsError::Empty),
            1 => statements.remove(0),
            n => return Err(RlsError::MultipleStatements(n)),
        };

        if !self.frontend.is_read_only(&statement) {
            warn!("Rejected non-read-only query");
            return Err(RlsError::NotReadOnly);
        }

        let tables = self.frontend.table_refs(&statement);
        for table in &tables {
            if !self.access.can_access_object(actor, table, Operation::Read) {
                warn!(table = %table, "Query rejected: table not readable");
                return Err(RlsError::TableDenied {
                    table: table.clone(),
                });
            }
        }

        if self.access.is_super_user(actor) {
            debug!(tables = ?tables, "Super-user query passed through");
            return Ok(self.frontend.serialize(&statement));
        }

        self.check_columns(&statement, actor)?;

        let target = self.frontend.single_table_target(&statement);
        let target_owned = match &target {
            Some(target) => self.is_owned(&target.name)?,
            None => false,
        };
        let mut owned_reads = 0;
        for table in &tables {
            if self.is_owned(table)? {
                owned_reads += 1;
            }
        }
        if owned_reads > usize::from(target_owned) {
            if self.reject_unresolved {
                warn!(tables = ?tables, "Query rejected: owned tables outside the filtered source");
                return Err(RlsError::UnresolvedSource);
            }
            debug!(tables = ?tables, "Ownership predicate does not cover every owned table");
        }

        if let Some(target) = target.filter(|_| target_owned) {
            // A nil actor never reaches this point: the table checks deny it.
            let actor_id = actor.map_or("", |user| user.id.as_str());
            validate_literal(actor_id)?;
            self.frontend
                .inject_predicate(&mut statement, &target, system::OWNER_ID, actor_id)?;
            info!(
                table = %target.name,
                qualifier = %target.qualifier(),
                user = %actor_id,
                "Ownership predicate injected"
            );
        }

        Ok(self.frontend.serialize(&statement))
    }

    fn is_owned(&self, table: &str) -> Result<bool> {
        Ok(self
            .access
            .metadata()
            .get_schema(table)?
            .is_some_and(|schema| schema.has_owner()))
    }

    fn check_field(
        &self,
        actor: Option<&UserSession>,
        schema: &ObjectMetadata,
        field: &str,
    ) -> Result<()> {
        if self.access.can_view_field(actor, schema, field) {
            return Ok(());
        }
        warn!(table = %schema.api_name, field = %field, "Query rejected: field not visible");
        Err(RlsError::FieldDenied {
            table: schema.api_name.clone(),
            field: field.to_string(),
        })
    }

    fn check_columns(&self, statement: &F::Statement, actor: Option<&UserSession>) -> Result<()> {
        let metadata = self.access.metadata();
        for column in self.frontend.column_refs(statement) {
            match column.source {
                ColumnSource::Table(table) => {
                    if let Some(schema) = metadata.get_schema(&table)? {
                        self.check_field(actor, &schema, &column.column)?;
                    }
                }
                // Checked inside the query that defines it.
                ColumnSource::Derived => {}
                ColumnSource::Unqualified(scopes) => {
                    // SQL binds the name in the innermost scope that has it;
                    // within that scope every candidate must be visible.
                    for scope in scopes {
                        let mut bound = false;
                        for table in scope {
                            let Some(schema) = metadata.get_schema(&table)? else {
                                continue;
                            };
                            if has_column(&schema, &column.column) {
                                bound = true;
                                self.check_field(actor, &schema, &column.column)?;
                            }
                        }
                        if bound {
                            break;
                        }
                    }
                }
                ColumnSource::Unknown(qualifier) => {
                    warn!(
                        qualifier = %qualifier,
                        field = %column.column,
                        "Query rejected: unknown qualifier"
                    );
                    return Err(RlsError::UnknownQualifier {
                        qualifier,
                        field: column.column,
                    });
                }
            }
        }
        Ok(())
    }
}

impl<F: SqlFrontend> std::fmt::Debug for RowLevelSecurity<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowLevelSecurity")
            .field("reject_unresolved", &self.reject_unresolved)
            .finish_non_exhaustive()
    }
}

fn has_column(schema: &ObjectMetadata, column: &str) -> bool {
    schema.field(column).is_some()
        || schema
            .storage_columns()
            .iter()
            .any(|stored| stored.eq_ignore_ascii_case(column))
}

/// Accepts only values that embed as a plain single-quoted literal: no
/// quotes, backslashes or control characters.
fn validate_literal(value: &str) -> Result<()> {
    if !value.is_empty()
        && !value.contains('\'')
        && !value.contains('\\')
        && !value.chars().any(char::is_control)
    {
        return Ok(());
    }
    Err(RlsError::UnsafeLiteral(value.to_string()))
}
