//! Record commands: list, get, create, update, delete, restore
//!
//! Reads go through the query cache. Writes patch the cached collection
//! optimistically, then invalidate it once the backend confirms.

use chrono::Utc;
use colored::Colorize;
use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tabled::Tabled;

use crate::cache::QueryParams;
use crate::cli::args::GlobalOptions;
use crate::cli::progress::spinner;
use crate::cli::{CommandContext, OutputFormat};
use crate::client::optimistic::{
    add_to_list, merge_fields, optimistic_update, remove_from_list, restore as restore_in_list,
    soft_delete, update_in_list,
};
use crate::error::{Error, Result};
use crate::models::{
    ActionPlan, ActionPlanDisplay, Audit, AuditDisplay, Control, ControlDisplay, RecordId,
    Regulation, RegulationDisplay, Resource, Risk, RiskDisplay, SoftDelete,
};
use crate::output::Formattable;
use crate::output::json::format_json;
use crate::output::table::format_record;

/// List the records of `resource`
pub async fn list(
    opts: &GlobalOptions,
    resource: Resource,
    params: &[(String, String)],
    refresh: bool,
    include_deleted: bool,
) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let runtime = &ctx.runtime;
    runtime.navigate(&resource.page_path(None));

    let path = resource.collection_path();
    let query: QueryParams = params.iter().cloned().collect();
    if refresh {
        runtime.cache().invalidate(&path);
    }

    let progress = spinner(format!("Fetching {}...", resource));
    let result = runtime.query(&path, &query).await;
    progress.finish_and_clear();

    let mut records = collection_records(result?);
    debug!("Fetched {} {}", records.len(), resource);
    if !include_deleted {
        records.retain(|record| !record.is_deleted());
    }

    match ctx.format {
        OutputFormat::Json => println!("{}", format_json(&records)?),
        OutputFormat::Table => print_table(resource, records)?,
    }
    Ok(())
}

/// Show one record
pub async fn get(opts: &GlobalOptions, resource: Resource, id: &str) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let id = parse_id(id);
    ctx.runtime.navigate(&resource.page_path(Some(&id)));

    let record = ctx
        .runtime
        .query_cached(&resource.record_path(&id), &QueryParams::new())
        .await?;
    print_record(&record, ctx.format)
}

/// Create a record
pub async fn create(opts: &GlobalOptions, resource: Resource, data: &str) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let runtime = &ctx.runtime;
    runtime.navigate(&resource.page_path(None));

    let body = parse_object(data)?;
    let path = resource.collection_path();
    let placeholder = body.clone();

    let created = optimistic_update(
        runtime.cache(),
        &path,
        Some(move |list: Vec<Value>| add_to_list(&list, placeholder)),
        runtime.post(&path, body),
    )
    .await?;

    report(ctx.format, &created, || {
        let id = created
            .get("id")
            .map(|id| format!(" {}", id))
            .unwrap_or_default();
        format!("Created {}{}", resource.singular(), id)
    })
}

/// Change fields of a record
pub async fn update(opts: &GlobalOptions, resource: Resource, id: &str, data: &str) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let runtime = &ctx.runtime;
    let id = parse_id(id);
    runtime.navigate(&resource.page_path(Some(&id)));

    let patch = parse_object(data)?;
    let fields = patch.clone();
    let record_id = id.clone();

    let updated = optimistic_update(
        runtime.cache(),
        &resource.collection_path(),
        Some(move |list: Vec<Value>| {
            update_in_list(&list, &record_id, |record| merge_fields(record, &fields))
        }),
        runtime.patch(&resource.record_path(&id), patch),
    )
    .await?;

    report(ctx.format, &updated, || {
        format!("Updated {} {}", resource.singular(), id)
    })
}

/// Delete a record, or mark it deleted with `soft`
pub async fn delete(opts: &GlobalOptions, resource: Resource, id: &str, soft: bool) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let runtime = &ctx.runtime;
    let id = parse_id(id);
    runtime.navigate(&resource.page_path(Some(&id)));

    let list_key = resource.collection_path();
    let record_path = resource.record_path(&id);
    let record_id = id.clone();

    let result = if soft {
        let deleted_at = Utc::now().to_rfc3339();
        let body = json!({"isDeleted": true, "deletedAt": deleted_at});
        optimistic_update(
            runtime.cache(),
            &list_key,
            Some(move |list: Vec<Value>| soft_delete(&list, &record_id, &deleted_at)),
            runtime.patch(&record_path, body),
        )
        .await?
    } else {
        optimistic_update(
            runtime.cache(),
            &list_key,
            Some(move |list: Vec<Value>| remove_from_list(&list, &record_id)),
            runtime.delete(&record_path),
        )
        .await?
    };

    report(ctx.format, &result, || {
        let verb = if soft { "Soft-deleted" } else { "Deleted" };
        format!("{} {} {}", verb, resource.singular(), id)
    })
}

/// Clear the deletion mark of a record
pub async fn restore(opts: &GlobalOptions, resource: Resource, id: &str) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let runtime = &ctx.runtime;
    let id = parse_id(id);
    runtime.navigate(&resource.page_path(Some(&id)));

    let record_id = id.clone();
    let restored = optimistic_update(
        runtime.cache(),
        &resource.collection_path(),
        Some(move |list: Vec<Value>| restore_in_list(&list, &record_id)),
        runtime.patch(
            &resource.record_path(&id),
            json!({"isDeleted": false, "deletedAt": null}),
        ),
    )
    .await?;

    report(ctx.format, &restored, || {
        format!("Restored {} {}", resource.singular(), id)
    })
}

/// Records of a collection response: a bare array or `{ "data": [...] }`
fn collection_records(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn print_table(resource: Resource, records: Vec<Value>) -> Result<()> {
    match resource {
        Resource::Risks => print_rows::<Risk, RiskDisplay>(records),
        Resource::Controls => print_rows::<Control, ControlDisplay>(records),
        Resource::Audits => print_rows::<Audit, AuditDisplay>(records),
        Resource::Regulations => print_rows::<Regulation, RegulationDisplay>(records),
        Resource::ActionPlans => print_rows::<ActionPlan, ActionPlanDisplay>(records),
    }
}

fn print_rows<T, D>(records: Vec<Value>) -> Result<()>
where
    T: DeserializeOwned,
    D: for<'a> From<&'a T> + Tabled + Serialize,
{
    let items = records
        .into_iter()
        .map(serde_json::from_value::<T>)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let rows: Vec<D> = items.iter().map(D::from).collect();
    rows.print(OutputFormat::Table)
}

fn print_record(record: &Value, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", format_json(record)?),
        OutputFormat::Table => println!("{}", format_record(record)),
    }
    Ok(())
}

/// Print a mutation result: the response as JSON, or a one-line summary
fn report<F>(format: OutputFormat, result: &Value, summary: F) -> Result<()>
where
    F: FnOnce() -> String,
{
    match format {
        OutputFormat::Json => println!("{}", format_json(result)?),
        OutputFormat::Table => println!("{} {}", "✓".green(), summary()),
    }
    Ok(())
}

fn parse_id(raw: &str) -> RecordId {
    match raw.parse() {
        Ok(id) => id,
        Err(never) => match never {},
    }
}

/// Parse `--data`, which must be a JSON object
pub fn parse_object(data: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(data)?;
    if !value.is_object() {
        return Err(Error::Other("--data must be a JSON object".to_string()));
    }
    Ok(value)
}
