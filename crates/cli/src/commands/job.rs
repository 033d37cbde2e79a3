//! `switchyard job`: scheduled work for an agent.

use chrono::{Local, Utc};
use switchyard_core::store::Store;
use switchyard_workflow::{JobPlanner, parse_when};

use super::{CmdResult, load_config, open_store, resolve_agent};

pub struct AddJob<'a> {
    pub agent: &'a str,
    pub instruction: &'a str,
    pub description: &'a str,
    pub at: Option<&'a str>,
    pub cron: Option<&'a str>,
}

pub async fn add(args: AddJob<'_>) -> CmdResult {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let agent = resolve_agent(store.as_ref(), args.agent).await?;
    let planner = JobPlanner::new(store.clone());

    let job = match (args.at, args.cron) {
        (Some(at), None) => {
            let when = parse_when(at, Utc::now()).ok_or_else(|| {
                format!("Could not understand time '{at}' (try 'in 2 hours', 'tomorrow 9am' or an ISO timestamp)")
            })?;
            planner
                .schedule_once(&agent.id, args.description, args.instruction, when)
                .await?
        }
        (None, Some(cron)) => {
            planner
                .schedule_recurring(&agent.id, args.description, args.instruction, cron)
                .await?
        }
        _ => return Err("Give exactly one of --at or --cron".into()),
    };

    println!("Scheduled job {} for '{}'", job.id, agent.name);
    if let Some(next) = job.next_run_at {
        println!("   Next run: {}", next.with_timezone(&Local).format("%Y-%m-%d %H:%M %Z"));
    }
    Ok(())
}

pub async fn list(agent: &str) -> CmdResult {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let agent = resolve_agent(store.as_ref(), agent).await?;
    let jobs = store.list_jobs(&agent.id).await?;

    if jobs.is_empty() {
        println!("No jobs for '{}'.", agent.name);
        return Ok(());
    }

    println!("Jobs for '{}' ({}):", agent.name, jobs.len());
    println!("{:-<72}", "");
    for job in &jobs {
        let next = job
            .next_run_at
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        let schedule = job.cron_expr.as_deref().unwrap_or(job.job_type.as_str());
        println!(
            "  {}  {:<9} {:<16} next {}",
            job.id,
            job.status.as_str(),
            schedule,
            next
        );
        println!("      └─ {}", job.description);
    }
    Ok(())
}

pub async fn delete(agent: &str, job_id: &str) -> CmdResult {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let agent = resolve_agent(store.as_ref(), agent).await?;
    if store.delete_job(&agent.id, job_id).await? {
        println!("Deleted job {job_id}");
        Ok(())
    } else {
        Err(format!("Job '{job_id}' not found for '{}'", agent.name).into())
    }
}
