//! Translates one IPC request into a `Storage`/pipeline call (§6.3).

use std::path::Path;
use std::sync::Arc;

use beads_core::dependency::Dependency;
use beads_core::enums::{DependencyType, Status};
use beads_core::filter::{IssueFilter, StaleFilter};
use beads_core::issue::IssueBuilder;
use beads_flush::FlushController;
use beads_storage::traits::IssueUpdates;
use beads_storage::Storage;
use chrono::{Duration, Utc};
use serde_json::json;

use crate::protocol::{Health, HealthState, Request, Response, PROTOCOL_VERSION};

/// Shared state every connection handler dispatches against.
pub struct DispatchContext {
    pub storage: Arc<dyn Storage>,
    pub flush: Arc<FlushController>,
    pub log_path: std::path::PathBuf,
}

/// Handles one decoded request, never panicking -- any error from the
/// underlying call is captured into `Response::err` so one bad request
/// can't take down the connection thread.
pub fn handle(ctx: &DispatchContext, req: Request) -> Response {
    let result = match req.op.as_str() {
        "health" => Ok(health_body()),
        "stats" => op_stats(ctx),
        "create" => op_create(ctx, &req.args),
        "update" => op_update(ctx, &req.args),
        "close" => op_close(ctx, &req.args),
        "show" => op_show(ctx, &req.args),
        "list" => op_list(ctx, &req.args),
        "dep.add" => op_dep_add(ctx, &req.args),
        "label.add" => op_label_add(ctx, &req.args),
        "export" => op_export(ctx),
        "import" => op_import(ctx, &req.args),
        "stale" => op_stale(ctx, &req.args),
        other => Err(format!("unknown op: {other}")),
    };

    match result {
        Ok(data) => Response::ok(data),
        Err(e) => Response::err(e),
    }
}

fn health_body() -> serde_json::Value {
    let health = Health {
        status: HealthState::Healthy,
        version: PROTOCOL_VERSION.to_string(),
        compatible: true,
        error: None,
    };
    json!(health)
}

fn op_stats(ctx: &DispatchContext) -> Result<serde_json::Value, String> {
    let stats = ctx.storage.get_statistics().map_err(|e| e.to_string())?;
    Ok(json!({
        "total_issues": stats.total_issues,
        "open_issues": stats.open_issues,
        "closed_issues": stats.closed_issues,
        "in_progress_issues": stats.in_progress_issues,
        "blocked_issues": stats.blocked_issues,
    }))
}

fn op_create(ctx: &DispatchContext, args: &serde_json::Value) -> Result<serde_json::Value, String> {
    let title = args["title"].as_str().ok_or("missing 'title'")?;
    let prefix = args["prefix"].as_str().ok_or("missing 'prefix'")?;
    let actor = args["actor"].as_str().unwrap_or("daemon");

    let n = ctx.storage.next_id(prefix).map_err(|e| e.to_string())?;
    let id = beads_core::idgen::format_id(prefix, n);

    let mut builder = IssueBuilder::new(title).id(&id).created_by(actor);
    if let Some(desc) = args["description"].as_str() {
        builder = builder.description(desc);
    }
    let issue = builder.build();

    ctx.storage.create_issue(&issue, actor).map_err(|e| e.to_string())?;
    ctx.flush.arm();
    Ok(json!({"id": id}))
}

fn op_update(ctx: &DispatchContext, args: &serde_json::Value) -> Result<serde_json::Value, String> {
    let id = args["id"].as_str().ok_or("missing 'id'")?;
    let actor = args["actor"].as_str().unwrap_or("daemon");

    let updates = IssueUpdates {
        title: args["title"].as_str().map(str::to_string),
        description: args["description"].as_str().map(str::to_string),
        design: args["design"].as_str().map(str::to_string),
        acceptance_criteria: args["acceptance_criteria"].as_str().map(str::to_string),
        notes: args["notes"].as_str().map(str::to_string),
        status: None,
        priority: args["priority"].as_i64().map(|p| p as i32),
        issue_type: None,
        assignee: args["assignee"].as_str().map(str::to_string),
        estimated_minutes: None,
        external_ref: None,
        closed_by_session: None,
    };

    ctx.storage.update_issue(id, &updates, actor).map_err(|e| e.to_string())?;
    ctx.flush.arm();
    Ok(json!({"id": id}))
}

fn op_close(ctx: &DispatchContext, args: &serde_json::Value) -> Result<serde_json::Value, String> {
    let id = args["id"].as_str().ok_or("missing 'id'")?;
    let reason = args["reason"].as_str().unwrap_or("");
    let actor = args["actor"].as_str().unwrap_or("daemon");
    let session = args["session"].as_str().unwrap_or("");

    ctx.storage.close_issue(id, reason, actor, session).map_err(|e| e.to_string())?;
    ctx.flush.arm();
    Ok(json!({"id": id}))
}

fn op_show(ctx: &DispatchContext, args: &serde_json::Value) -> Result<serde_json::Value, String> {
    let id = args["id"].as_str().ok_or("missing 'id'")?;
    let issue = ctx.storage.get_issue(id).map_err(|e| e.to_string())?;
    serde_json::to_value(issue).map_err(|e| e.to_string())
}

fn op_list(ctx: &DispatchContext, args: &serde_json::Value) -> Result<serde_json::Value, String> {
    let query = args["query"].as_str().unwrap_or("");
    let filter = IssueFilter::default();
    let issues = ctx.storage.search_issues(query, &filter).map_err(|e| e.to_string())?;
    serde_json::to_value(issues).map_err(|e| e.to_string())
}

fn op_dep_add(ctx: &DispatchContext, args: &serde_json::Value) -> Result<serde_json::Value, String> {
    let issue_id = args["issue_id"].as_str().ok_or("missing 'issue_id'")?;
    let depends_on_id = args["depends_on_id"].as_str().ok_or("missing 'depends_on_id'")?;
    let dep_type = args["dep_type"].as_str().unwrap_or("blocks");
    let actor = args["actor"].as_str().unwrap_or("daemon");

    let dep_type = match dep_type {
        "blocks" => DependencyType::Blocks,
        "related" => DependencyType::Related,
        "parent-child" => DependencyType::ParentChild,
        "discovered-from" => DependencyType::DiscoveredFrom,
        other => return Err(format!("unknown dependency type: {other}")),
    };

    let dep = Dependency {
        issue_id: issue_id.to_string(),
        depends_on_id: depends_on_id.to_string(),
        dep_type,
        created_at: Utc::now(),
        created_by: actor.to_string(),
    };
    ctx.storage.add_dependency(&dep, actor).map_err(|e| e.to_string())?;
    ctx.flush.arm();
    Ok(json!({"issue_id": issue_id, "depends_on_id": depends_on_id}))
}

fn op_label_add(ctx: &DispatchContext, args: &serde_json::Value) -> Result<serde_json::Value, String> {
    let issue_id = args["issue_id"].as_str().ok_or("missing 'issue_id'")?;
    let label = args["label"].as_str().ok_or("missing 'label'")?;
    let actor = args["actor"].as_str().unwrap_or("daemon");

    ctx.storage.add_label(issue_id, label, actor).map_err(|e| e.to_string())?;
    ctx.flush.arm();
    Ok(json!({"issue_id": issue_id, "label": label}))
}

fn op_export(ctx: &DispatchContext) -> Result<serde_json::Value, String> {
    ctx.flush.flush().map_err(|e| e.to_string())?;
    Ok(json!({"flushed": true}))
}

fn op_import(ctx: &DispatchContext, args: &serde_json::Value) -> Result<serde_json::Value, String> {
    let auto_resolve = args["auto_resolve"].as_bool().unwrap_or(true);
    let report = beads_import::auto_import(ctx.storage.as_ref(), log_path(ctx), auto_resolve)
        .map_err(|e| e.to_string())?;
    Ok(json!({
        "skipped": report.skipped,
        "created": report.created,
        "updated": report.updated,
        "unchanged": report.unchanged,
        "remapped": report.remapped,
        "unresolved_collisions": report.unresolved_collisions,
    }))
}

fn op_stale(ctx: &DispatchContext, args: &serde_json::Value) -> Result<serde_json::Value, String> {
    let filter = StaleFilter {
        days: args["days"].as_i64().map(|d| d as i32).unwrap_or(30),
        status: args["status"].as_str().map(str::to_string),
        limit: args["limit"].as_i64().map(|l| l as i32),
    };

    let cutoff = Utc::now() - Duration::days(filter.days as i64);
    let mut issue_filter = IssueFilter {
        updated_before: Some(cutoff),
        limit: filter.limit,
        ..Default::default()
    };
    match &filter.status {
        Some(s) => issue_filter.status = Some(Status::from(s.as_str())),
        None => issue_filter.exclude_status = vec![Status::Closed],
    }

    let issues = ctx
        .storage
        .search_issues("", &issue_filter)
        .map_err(|e| e.to_string())?;
    serde_json::to_value(issues).map_err(|e| e.to_string())
}

fn log_path(ctx: &DispatchContext) -> &Path {
    &ctx.log_path
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_storage::SqliteStore;

    fn test_ctx() -> (DispatchContext, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let log_path = dir.path().join("issues.jsonl");
        let flush = FlushController::init(storage.clone(), log_path.clone(), std::time::Duration::from_secs(3600));
        (DispatchContext { storage, flush, log_path }, dir)
    }

    #[test]
    fn health_reports_compatible() {
        let (ctx, _dir) = test_ctx();
        let resp = handle(&ctx, Request { op: "health".into(), args: json!({}) });
        assert!(resp.ok);
        assert_eq!(resp.data.unwrap()["compatible"], true);
    }

    #[test]
    fn create_then_show_round_trips() {
        let (ctx, _dir) = test_ctx();
        let resp = handle(
            &ctx,
            Request { op: "create".into(), args: json!({"title": "New issue", "prefix": "bd"}) },
        );
        assert!(resp.ok);
        let id = resp.data.unwrap()["id"].as_str().unwrap().to_string();

        let resp = handle(&ctx, Request { op: "show".into(), args: json!({"id": id}) });
        assert!(resp.ok);
        assert_eq!(resp.data.unwrap()["title"], "New issue");
    }

    #[test]
    fn unknown_op_is_an_error_response_not_a_panic() {
        let (ctx, _dir) = test_ctx();
        let resp = handle(&ctx, Request { op: "bogus".into(), args: json!({}) });
        assert!(!resp.ok);
        assert!(resp.error.unwrap().contains("unknown op"));
    }

    #[test]
    fn missing_required_arg_is_an_error_response() {
        let (ctx, _dir) = test_ctx();
        let resp = handle(&ctx, Request { op: "show".into(), args: json!({}) });
        assert!(!resp.ok);
    }

    #[test]
    fn stale_returns_issues_untouched_past_the_cutoff() {
        use beads_core::issue::IssueBuilder;

        let (ctx, _dir) = test_ctx();
        let old = IssueBuilder::new("Forgotten")
            .id("bd-1")
            .updated_at(Utc::now() - Duration::days(90))
            .build();
        let fresh = IssueBuilder::new("Active").id("bd-2").build();
        ctx.storage.create_issue(&old, "alice").unwrap();
        ctx.storage.create_issue(&fresh, "alice").unwrap();

        let resp = handle(&ctx, Request { op: "stale".into(), args: json!({"days": 30}) });
        assert!(resp.ok);
        let data = resp.data.unwrap();
        let ids: Vec<&str> = data.as_array().unwrap().iter().map(|v| v["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["bd-1"]);
    }
}
