//! Terminal rendering for CLI output

use colored::Colorize;
use elemid_core::analytics::UsageReport;
use elemid_core::{
    Alias, AnalyticsRecord, Entity, IntegrityReport, MonitorEvent, ParsedId, RegisterOutcome,
    Registry, RemapReport,
};
use serde::Serialize;

pub fn json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn registered(outcome: &RegisterOutcome, alias: Option<&str>) {
    let status = if outcome.created { "new".green() } else { "known".dimmed() };
    match alias {
        Some(alias) => println!("{:>5}  {}  ({})", status, outcome.id(), alias.bold()),
        None => println!("{:>5}  {}", status, outcome.id()),
    }
}

pub fn entity(entity: &Entity, aliases: &[Alias], analytics: Option<&AnalyticsRecord>) {
    println!("{}", entity.id.bold());
    println!("  name       {}", entity.name);
    println!("  type       {}", entity.element_type);
    println!("  namespace  {}", entity.namespace);
    if let Some(parent) = &entity.parent_id {
        println!("  parent     {}", parent);
    }
    println!("  lifecycle  {:?}", entity.lifecycle);
    println!("  enabled    {}", entity.enabled);
    println!("  priority   {}", entity.priority);
    println!("  accesses   {}", entity.access_count);
    println!("  created    {}", entity.created_at.to_rfc3339());
    println!("  last seen  {}", entity.last_accessed_at.to_rfc3339());
    if !aliases.is_empty() {
        let names: Vec<String> = aliases
            .iter()
            .map(|a| if a.is_primary { a.alias.bold().to_string() } else { a.alias.clone() })
            .collect();
        println!("  aliases    {}", names.join(", "));
    }
    if let Some(record) = analytics {
        if record.execution_count > 0 {
            println!(
                "  executions {} ({:.1} ms avg, {} failed)",
                record.execution_count, record.avg_execution_ms, record.failure_count
            );
        }
        println!("  peak/hour  {}", record.peak_hourly_accesses);
    }
}

pub fn entity_list(entities: &[Entity]) {
    if entities.is_empty() {
        println!("{}", "no matches".dimmed());
        return;
    }
    for entity in entities {
        println!("{}  {}", entity.id, entity.name.dimmed());
    }
}

pub fn parsed(id: &str, parsed: &ParsedId) {
    println!("{}  [{}]", id.bold(), parsed.kind().cyan());
    match parsed {
        ParsedId::Standard { uuid } => println!("  uuid       {}", uuid),
        ParsedId::Prefixed { namespace, prefix, uuid } => {
            if let Some(ns) = namespace {
                println!("  namespace  {}", ns);
            }
            println!("  prefix     {}", prefix);
            println!("  uuid       {}", uuid);
        }
        ParsedId::Deterministic { namespace, version, element_type, digest } => {
            println!("  namespace  {}", namespace);
            println!("  version    {}", version);
            println!("  type       {}", element_type);
            println!("  digest     {}", digest);
        }
    }
}

fn label(registry: &Registry, id: &str) -> anyhow::Result<String> {
    let name = registry
        .find_by_id(id)?
        .map(|e| format!("{} ({})", e.name, e.element_type))
        .unwrap_or_default();
    let alias = registry.primary_alias(id)?.map(|a| format!(" @{}", a.alias)).unwrap_or_default();
    Ok(format!("{} {}{}", id, name.dimmed(), alias.yellow()))
}

pub fn tree(registry: &Registry, root: &str) -> anyhow::Result<()> {
    println!("{}", label(registry, root)?);
    branch(registry, root, "")
}

fn branch(registry: &Registry, id: &str, indent: &str) -> anyhow::Result<()> {
    let children = registry.get_children(id)?;
    for (i, edge) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        let (joint, pad) = if last { ("└─", "   ") } else { ("├─", "│  ") };
        println!("{}{} {}", indent, joint, label(registry, &edge.child_id)?);
        branch(registry, &edge.child_id, &format!("{}{}", indent, pad))?;
    }
    Ok(())
}

pub fn tree_json(registry: &Registry, id: &str) -> anyhow::Result<serde_json::Value> {
    let children = registry
        .get_children(id)?
        .iter()
        .map(|edge| tree_json(registry, &edge.child_id))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(serde_json::json!({
        "id": id,
        "alias": registry.primary_alias(id)?.map(|a| a.alias),
        "children": children,
    }))
}

pub fn integrity(report: &IntegrityReport) {
    if report.is_clean() {
        println!("{} hierarchy is consistent", "✓".green());
        return;
    }
    for edge in &report.orphaned_edges {
        println!("{} orphaned edge {} → {}", "✗".red(), edge.parent_id, edge.child_id);
    }
    for cycle in &report.cycles {
        println!("{} cycle {}", "✗".red(), cycle.join(" → "));
    }
    for m in &report.depth_mismatches {
        println!(
            "{} depth of {} is {}, expected {}",
            "✗".red(),
            m.id,
            m.recorded,
            m.expected
        );
    }
    for id in &report.parent_mismatches {
        println!("{} parent column of {} disagrees with its edge", "✗".red(), id);
    }
}

pub fn monitor_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::DuplicateId { id, count } => {
            println!("{} duplicate id {} ({} rows)", "✗".red(), id, count)
        }
        MonitorEvent::OrphanedEdge { edge } => println!(
            "{} orphaned edge {} → {}",
            "✗".red(),
            edge.parent_id,
            edge.child_id
        ),
        MonitorEvent::MalformedId { id, reason } => {
            println!("{} malformed id {}: {}", "✗".red(), id, reason)
        }
        MonitorEvent::MonitoringError { sweep, message } => match sweep {
            Some(sweep) => println!("{} {} sweep failed: {}", "!".yellow(), sweep, message),
            None => println!("{} scan failed: {}", "!".yellow(), message),
        },
        MonitorEvent::ScanCompleted { findings: 0, elapsed_ms } => {
            println!("{} clean ({} ms)", "✓".green(), elapsed_ms)
        }
        MonitorEvent::ScanCompleted { findings, elapsed_ms } => {
            println!("{} {} finding(s) ({} ms)", "●".red(), findings, elapsed_ms)
        }
    }
}

pub fn usage(report: &UsageReport) {
    match &report.range {
        Some(range) => println!(
            "{} {} .. {}",
            "Usage".bold(),
            range.start.to_rfc3339(),
            range.end.to_rfc3339()
        ),
        None => println!("{} all time", "Usage".bold()),
    }
    println!("  active elements   {}", report.active_elements);
    println!("  accesses          {}", report.total_accesses);
    println!("  executions        {}", report.total_executions);
    if let Some(rate) = report.success_rate {
        println!("  success rate      {:.1}%", rate * 100.0);
    }
    if let Some(avg) = report.avg_execution_ms {
        println!("  avg execution     {:.1} ms", avg);
    }
    println!("  deleted           {}", report.deleted_elements);
    if let Some(lifetime) = report.average_lifetime_ms {
        println!("  avg lifetime      {:.1} s", lifetime / 1000.0);
    }
    if !report.most_used.is_empty() {
        println!("{}", "Most used".bold());
        for entry in &report.most_used {
            println!("  {:>8}  {}", entry.accesses, entry.id);
        }
    }
    if !report.slowest_actions.is_empty() {
        println!("{}", "Slowest actions".bold());
        for stats in &report.slowest_actions {
            println!(
                "  {:>8.1} ms  {} {}",
                stats.avg_duration_ms, stats.id, stats.action
            );
        }
    }
}

pub fn remap(report: &RemapReport) {
    println!(
        "{} {} → {}",
        report.namespace.bold(),
        report.old_version,
        report.new_version
    );
    for mapping in &report.mappings {
        match &mapping.new_id {
            Some(new_id) => println!(
                "  {} {} → {}  [{} {:.1}]",
                "✓".green(),
                mapping.old_id,
                new_id,
                mapping.source.as_str(),
                mapping.confidence
            ),
            None => println!("  {} {} orphaned", "✗".red(), mapping.old_id),
        }
    }
    for id in &report.unmatched_new {
        println!("  {} {} new", "+".cyan(), id);
    }
}
