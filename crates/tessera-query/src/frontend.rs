//! Pluggable SQL frontends.
//!
//! The rewriter only talks to [`SqlFrontend`]; swapping the parser does not
//! touch the access-control logic that drives it.

use crate::error::{Result, RlsError};
use sqlparser::ast::{
    BinaryOperator, Expr, Ident, ObjectName, ObjectNamePart, Query, SetExpr, Statement,
    TableFactor, TableWithJoins, Value, Visit, Visitor, visit_relations,
};
use sqlparser::dialect::{GenericDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::ops::ControlFlow;

/// A table named in the FROM clause, with its alias if it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTarget {
    pub name: String,
    pub alias: Option<String>,
}

impl TableTarget {
    /// The qualifier columns of this table are written with.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// What a column reference's qualifier resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    /// A named table, through its name or alias.
    Table(String),
    /// A CTE or derived table. Its own columns are checked where it is
    /// defined.
    Derived,
    /// No qualifier. Candidate tables of each enclosing scope, innermost
    /// first; the first scope with a table that has the column binds it.
    Unqualified(Vec<Vec<String>>),
    /// The qualifier names nothing in scope.
    Unknown(String),
}

/// A column reference and where it can come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub source: ColumnSource,
    pub column: String,
}

/// Parse, inspect, rewrite and serialize SQL.
pub trait SqlFrontend: Send + Sync {
    type Statement;

    fn parse(&self, sql: &str) -> Result<Vec<Self::Statement>>;

    /// True if the statement cannot modify data.
    fn is_read_only(&self, statement: &Self::Statement) -> bool;

    /// Every table reference, once per occurrence, CTE names excluded.
    fn table_refs(&self, statement: &Self::Statement) -> Vec<String>;

    /// Every column reference, each resolved against the FROM clause of the
    /// query it appears in and then the enclosing ones.
    fn column_refs(&self, statement: &Self::Statement) -> Vec<ColumnRef>;

    /// The single named table the statement reads from, if there is exactly
    /// one and no joins.
    fn single_table_target(&self, statement: &Self::Statement) -> Option<TableTarget>;

    /// Conjoins `<qualifier>.<column> = '<value>'` with the statement's filter.
    fn inject_predicate(
        &self,
        statement: &mut Self::Statement,
        target: &TableTarget,
        column: &str,
        value: &str,
    ) -> Result<()>;

    fn serialize(&self, statement: &Self::Statement) -> String;
}

/// SQL dialect understood by [`SqlparserFrontend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SqlDialect {
    #[default]
    Generic,
    Sqlite,
    Postgres,
}

impl std::str::FromStr for SqlDialect {
    type Err = RlsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "generic" => Ok(Self::Generic),
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(RlsError::Unsupported(format!("unknown SQL dialect '{other}'"))),
        }
    }
}

/// [`SqlFrontend`] built on `sqlparser`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlparserFrontend {
    dialect: SqlDialect,
}

impl SqlparserFrontend {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }
}

impl SqlFrontend for SqlparserFrontend {
    type Statement = Statement;

    fn parse(&self, sql: &str) -> Result<Vec<Statement>> {
        let parsed = match self.dialect {
            SqlDialect::Generic => Parser::parse_sql(&GenericDialect {}, sql),
            SqlDialect::Sqlite => Parser::parse_sql(&SQLiteDialect {}, sql),
            SqlDialect::Postgres => Parser::parse_sql(&PostgreSqlDialect {}, sql),
        };
        parsed.map_err(|e| RlsError::Parse(e.to_string()))
    }

    fn is_read_only(&self, statement: &Statement) -> bool {
        match statement {
            Statement::Query(query) => query_is_read_only(query),
            _ => false,
        }
    }

    fn table_refs(&self, statement: &Statement) -> Vec<String> {
        let ctes = cte_names(statement);
        let mut tables = Vec::new();
        let _ = visit_relations(statement, |name: &ObjectName| {
            if let Some(table) = last_ident(name) {
                if !ctes.contains(&table.to_ascii_lowercase()) {
                    tables.push(table);
                }
            }
            ControlFlow::<()>::Continue(())
        });
        tables
    }

    fn column_refs(&self, statement: &Statement) -> Vec<ColumnRef> {
        let mut resolver = ScopeResolver::default();
        let _ = statement.visit(&mut resolver);
        resolver.columns
    }

    fn single_table_target(&self, statement: &Statement) -> Option<TableTarget> {
        let Statement::Query(query) = statement else {
            return None;
        };
        let SetExpr::Select(select) = query.body.as_ref() else {
            return None;
        };
        match select.from.as_slice() {
            [only] if only.joins.is_empty() => table_target(only),
            _ => None,
        }
    }

    fn inject_predicate(
        &self,
        statement: &mut Statement,
        target: &TableTarget,
        column: &str,
        value: &str,
    ) -> Result<()> {
        let Statement::Query(query) = statement else {
            return Err(RlsError::Unsupported("not a query".to_string()));
        };
        let SetExpr::Select(select) = query.body.as_mut() else {
            return Err(RlsError::Unsupported(
                "only simple SELECT queries can be filtered".to_string(),
            ));
        };

        let left = match &target.alias {
            Some(alias) => Expr::CompoundIdentifier(vec![Ident::new(alias), Ident::new(column)]),
            None => Expr::Identifier(Ident::new(column)),
        };
        let predicate = Expr::BinaryOp {
            left: Box::new(left),
            op: BinaryOperator::Eq,
            right: Box::new(Expr::value(Value::SingleQuotedString(value.to_string()))),
        };

        // The existing filter is nested so an OR in it cannot swallow the
        // injected predicate.
        select.selection = Some(match select.selection.take() {
            Some(existing) => Expr::BinaryOp {
                left: Box::new(Expr::Nested(Box::new(existing))),
                op: BinaryOperator::And,
                right: Box::new(predicate),
            },
            None => predicate,
        });
        Ok(())
    }

    fn serialize(&self, statement: &Statement) -> String {
        statement.to_string()
    }
}

fn query_is_read_only(query: &Query) -> bool {
    if !query.locks.is_empty() {
        return false;
    }
    let ctes_read_only = query
        .with
        .as_ref()
        .is_none_or(|with| with.cte_tables.iter().all(|cte| query_is_read_only(&cte.query)));
    ctes_read_only && set_expr_is_read_only(&query.body)
}

fn set_expr_is_read_only(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => query_is_read_only(query),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_is_read_only(left) && set_expr_is_read_only(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        _ => false,
    }
}

fn cte_names(statement: &Statement) -> HashSet<String> {
    let Statement::Query(query) = statement else {
        return HashSet::new();
    };
    query
        .with
        .iter()
        .flat_map(|with| &with.cte_tables)
        .map(|cte| cte.alias.name.value.to_ascii_lowercase())
        .collect()
}

/// A FROM item as seen by column resolution.
#[derive(Debug)]
enum Source {
    Table { name: String, alias: Option<String> },
    Derived(String),
}

impl Source {
    fn binds(&self, qualifier: &str) -> bool {
        match self {
            Self::Table { name, alias } => {
                name.eq_ignore_ascii_case(qualifier)
                    || alias.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(qualifier))
            }
            Self::Derived(name) => name.eq_ignore_ascii_case(qualifier),
        }
    }
}

/// Column names visible in one query: its CTEs and its FROM items.
#[derive(Debug, Default)]
struct Scope {
    ctes: Vec<String>,
    sources: Vec<Source>,
}

/// Walks the statement keeping one [`Scope`] per nested query.
#[derive(Debug, Default)]
struct ScopeResolver {
    scopes: Vec<Scope>,
    columns: Vec<ColumnRef>,
}

impl ScopeResolver {
    fn is_cte(&self, name: &str) -> bool {
        self.scopes
            .iter()
            .flat_map(|scope| &scope.ctes)
            .any(|cte| cte.eq_ignore_ascii_case(name))
    }

    fn scope_for(&self, query: &Query) -> Scope {
        let ctes = query
            .with
            .iter()
            .flat_map(|with| &with.cte_tables)
            .map(|cte| cte.alias.name.value.clone())
            .collect();
        let mut scope = Scope {
            ctes,
            sources: Vec::new(),
        };
        let mut items = Vec::new();
        collect_from(&query.body, &mut items);
        for factor in items {
            self.add_source(&mut scope, factor);
        }
        scope
    }

    fn add_source(&self, scope: &mut Scope, factor: &TableFactor) {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let Some(table) = last_ident(name) else {
                    return;
                };
                let alias = alias.as_ref().map(|a| a.name.value.clone());
                let local_cte = scope.ctes.iter().any(|c| c.eq_ignore_ascii_case(&table));
                if local_cte || self.is_cte(&table) {
                    scope.sources.push(Source::Derived(alias.unwrap_or(table)));
                } else {
                    scope.sources.push(Source::Table { name: table, alias });
                }
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                for factor in join_factors(table_with_joins) {
                    self.add_source(scope, factor);
                }
            }
            other => {
                if let Some(alias) = factor_alias(other) {
                    scope.sources.push(Source::Derived(alias));
                }
            }
        }
    }

    fn resolve(&self, qualifier: Option<&str>, column: &str) -> ColumnRef {
        let source = match qualifier {
            None => ColumnSource::Unqualified(
                self.scopes
                    .iter()
                    .rev()
                    .map(|scope| {
                        scope
                            .sources
                            .iter()
                            .filter_map(|source| match source {
                                Source::Table { name, .. } => Some(name.clone()),
                                Source::Derived(_) => None,
                            })
                            .collect()
                    })
                    .collect(),
            ),
            Some(qualifier) => self
                .scopes
                .iter()
                .rev()
                .flat_map(|scope| &scope.sources)
                .find(|source| source.binds(qualifier))
                .map_or_else(
                    || {
                        if self.is_cte(qualifier) {
                            ColumnSource::Derived
                        } else {
                            ColumnSource::Unknown(qualifier.to_string())
                        }
                    },
                    |source| match source {
                        Source::Table { name, .. } => ColumnSource::Table(name.clone()),
                        Source::Derived(_) => ColumnSource::Derived,
                    },
                ),
        };
        ColumnRef {
            source,
            column: column.to_string(),
        }
    }

    fn record(&mut self, column: ColumnRef) {
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
    }
}

impl Visitor for ScopeResolver {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<()> {
        let scope = self.scope_for(query);
        self.scopes.push(scope);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<()> {
        self.scopes.pop();
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<()> {
        match expr {
            Expr::Identifier(ident) => {
                let column = self.resolve(None, &ident.value);
                self.record(column);
            }
            Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
                let qualifier = &parts[parts.len() - 2].value;
                let column = self.resolve(Some(qualifier), &parts[parts.len() - 1].value);
                self.record(column);
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

/// FROM items of every SELECT in a set expression. Nested queries get
/// their own scope.
fn collect_from<'a>(body: &'a SetExpr, items: &mut Vec<&'a TableFactor>) {
    match body {
        SetExpr::Select(select) => {
            items.extend(select.from.iter().flat_map(join_factors));
        }
        SetExpr::SetOperation { left, right, .. } => {
            collect_from(left, items);
            collect_from(right, items);
        }
        _ => {}
    }
}

fn join_factors(twj: &TableWithJoins) -> impl Iterator<Item = &TableFactor> {
    std::iter::once(&twj.relation).chain(twj.joins.iter().map(|join| &join.relation))
}

fn factor_alias(factor: &TableFactor) -> Option<String> {
    match factor {
        TableFactor::Derived { alias, .. }
        | TableFactor::TableFunction { alias, .. }
        | TableFactor::Function { alias, .. }
        | TableFactor::UNNEST { alias, .. }
        | TableFactor::JsonTable { alias, .. }
        | TableFactor::Pivot { alias, .. }
        | TableFactor::Unpivot { alias, .. } => alias.as_ref().map(|a| a.name.value.clone()),
        _ => None,
    }
}

fn table_target(twj: &TableWithJoins) -> Option<TableTarget> {
    factor_target(&twj.relation)
}

fn factor_target(factor: &TableFactor) -> Option<TableTarget> {
    match factor {
        TableFactor::Table { name, alias, .. } => Some(TableTarget {
            name: last_ident(name)?,
            alias: alias.as_ref().map(|a| a.name.value.clone()),
        }),
        _ => None,
    }
}

/// Unqualified table name: `main.account` is `account`.
fn last_ident(name: &ObjectName) -> Option<String> {
    match name.0.last()? {
        ObjectNamePart::Identifier(ident) => Some(ident.value.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn parse_one(sql: &str) -> Statement {
        SqlparserFrontend::default()
            .parse(sql)
            .unwrap()
            .into_iter()
            .next()
            .unwrap()
    }

    #[test_case("SELECT name FROM account", true)]
    #[test_case("SELECT a FROM x UNION SELECT b FROM y", true)]
    #[test_case("WITH t AS (SELECT id FROM account) SELECT id FROM t", true)]
    #[test_case("SELECT id FROM account FOR UPDATE", false)]
    #[test_case("DELETE FROM account", false)]
    #[test_case("UPDATE account SET name = 'x'", false)]
    #[test_case("INSERT INTO account (name) VALUES ('x')", false)]
    #[test_case("DROP TABLE account", false)]
    fn test_read_only(sql: &str, expected: bool) {
        let frontend = SqlparserFrontend::default();
        assert_eq!(frontend.is_read_only(&parse_one(sql)), expected);
    }

    #[test]
    fn test_table_refs_exclude_ctes_and_include_subqueries() {
        let frontend = SqlparserFrontend::default();
        let stmt = parse_one(
            "WITH recent AS (SELECT id FROM contact) \
             SELECT a.name FROM account a JOIN recent r ON r.id = a.id \
             WHERE a.id IN (SELECT account_id FROM opportunity)",
        );
        let tables = frontend.table_refs(&stmt);
        assert_eq!(tables, vec!["contact", "account", "opportunity"]);

        let stmt = parse_one("SELECT id FROM account WHERE id IN (SELECT id FROM account)");
        assert_eq!(frontend.table_refs(&stmt), vec!["account", "account"]);
    }

    fn source_of(columns: &[ColumnRef], column: &str) -> ColumnSource {
        columns
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.source.clone())
            .unwrap()
    }

    #[test]
    fn test_column_refs_resolve_aliases() {
        let frontend = SqlparserFrontend::default();
        let stmt = parse_one("SELECT a.name, industry FROM account AS a WHERE a.secret = 'x'");
        let columns = frontend.column_refs(&stmt);
        assert_eq!(source_of(&columns, "name"), ColumnSource::Table("account".into()));
        assert_eq!(source_of(&columns, "secret"), ColumnSource::Table("account".into()));
        assert_eq!(
            source_of(&columns, "industry"),
            ColumnSource::Unqualified(vec![vec!["account".into()]])
        );
    }

    #[test]
    fn test_column_refs_use_innermost_scope() {
        let frontend = SqlparserFrontend::default();
        let stmt = parse_one(
            "SELECT code, (SELECT x.secret FROM account x WHERE x.industry = c.code) \
             FROM country c WHERE EXISTS (SELECT 1 FROM contact WHERE account_id = 'a1')",
        );
        let columns = frontend.column_refs(&stmt);
        assert_eq!(source_of(&columns, "secret"), ColumnSource::Table("account".into()));
        assert_eq!(source_of(&columns, "code"), ColumnSource::Unqualified(vec![vec!["country".into()]]));
        assert_eq!(
            source_of(&columns, "account_id"),
            ColumnSource::Unqualified(vec![vec!["contact".into()], vec!["country".into()]])
        );
        assert!(columns.contains(&ColumnRef {
            source: ColumnSource::Table("country".into()),
            column: "code".into()
        }));
    }

    #[test]
    fn test_column_refs_join_lists_every_table() {
        let frontend = SqlparserFrontend::default();
        let stmt = parse_one("SELECT industry FROM account a JOIN contact c ON c.account_id = a.id");
        let columns = frontend.column_refs(&stmt);
        assert_eq!(
            source_of(&columns, "industry"),
            ColumnSource::Unqualified(vec![vec!["account".into(), "contact".into()]])
        );
    }

    #[test]
    fn test_column_refs_derived_and_unknown_qualifiers() {
        let frontend = SqlparserFrontend::default();
        let stmt = parse_one(
            "WITH recent AS (SELECT id FROM contact) \
             SELECT r.id, d.total, z.secret FROM recent r \
             JOIN (SELECT COUNT(*) AS total FROM account) AS d ON 1 = 1",
        );
        let columns = frontend.column_refs(&stmt);
        assert_eq!(source_of(&columns, "total"), ColumnSource::Derived);
        assert!(columns.contains(&ColumnRef {
            source: ColumnSource::Derived,
            column: "id".into()
        }));
        assert_eq!(source_of(&columns, "secret"), ColumnSource::Unknown("z".into()));
    }

    #[test]
    fn test_single_table_target() {
        let frontend = SqlparserFrontend::default();
        assert_eq!(
            frontend.single_table_target(&parse_one("SELECT * FROM main.account acc")),
            Some(TableTarget {
                name: "account".into(),
                alias: Some("acc".into())
            })
        );
        assert!(
            frontend
                .single_table_target(&parse_one("SELECT * FROM a JOIN b ON a.id = b.a_id"))
                .is_none()
        );
        assert!(
            frontend
                .single_table_target(&parse_one("SELECT * FROM (SELECT 1) AS s"))
                .is_none()
        );
    }

    #[test]
    fn test_inject_preserves_or_precedence() {
        let frontend = SqlparserFrontend::default();
        let mut stmt = parse_one("SELECT name FROM account WHERE a = 1 OR b = 2");
        let target = frontend.single_table_target(&stmt).unwrap();
        frontend
            .inject_predicate(&mut stmt, &target, "owner_id", "u1")
            .unwrap();
        let sql = frontend.serialize(&stmt);
        assert!(sql.contains("(a = 1 OR b = 2) AND owner_id = 'u1'"), "{sql}");
        // The rewritten text parses back.
        assert!(frontend.parse(&sql).is_ok());
    }

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("SQLite".parse::<SqlDialect>().unwrap(), SqlDialect::Sqlite);
        assert_eq!("postgresql".parse::<SqlDialect>().unwrap(), SqlDialect::Postgres);
        assert!("oracle".parse::<SqlDialect>().is_err());
    }
}
