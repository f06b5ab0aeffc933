//! Daily analytics rollup. Counts the tickets created on a given day and the
//! average time-to-solve of tickets solved that day, then upserts the result
//! into `ticket_analytics`. Run it from cron, once per day, for yesterday:
//!
//!     rollup            # yesterday
//!     rollup 2026-08-01 # a specific day, e.g. to backfill

use std::env;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use helpdesk::{
    config::AppConfig,
    db,
    models::{NewTicketAnalytics, Ticket, STATUS_SOLVED},
    schema::{ticket_analytics, tickets},
};

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let date = match env::args().nth(1) {
        Some(raw) => raw
            .parse::<NaiveDate>()
            .with_context(|| format!("invalid date {raw:?}, expected YYYY-MM-DD"))?,
        None => (Utc::now() - Duration::days(1)).date_naive(),
    };

    let config = AppConfig::from_env()?;
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let day_start = date
        .and_hms_opt(0, 0, 0)
        .context("invalid start of day")?;
    let day_end = day_start + Duration::days(1);

    let created: Vec<Ticket> = tickets::table
        .filter(tickets::created_at.ge(day_start))
        .filter(tickets::created_at.lt(day_end))
        .load(&mut conn)?;

    // updated_at of a solved ticket is its resolution time; later edits to
    // solved tickets are rare enough that the approximation holds.
    let solved: Vec<Ticket> = tickets::table
        .filter(tickets::status.eq(STATUS_SOLVED))
        .filter(tickets::updated_at.ge(day_start))
        .filter(tickets::updated_at.lt(day_end))
        .load(&mut conn)?;

    let avg_resolution_minutes = if solved.is_empty() {
        None
    } else {
        let total_minutes: i64 = solved
            .iter()
            .map(|ticket| (ticket.updated_at - ticket.created_at).num_minutes())
            .sum();
        Some((total_minutes / solved.len() as i64) as i32)
    };

    let row = NewTicketAnalytics {
        id: Uuid::new_v4(),
        date,
        ticket_volume: created.len() as i32,
        avg_resolution_minutes,
    };

    diesel::insert_into(ticket_analytics::table)
        .values(&row)
        .on_conflict(ticket_analytics::date)
        .do_update()
        .set((
            ticket_analytics::ticket_volume.eq(row.ticket_volume),
            ticket_analytics::avg_resolution_minutes.eq(row.avg_resolution_minutes),
        ))
        .execute(&mut conn)?;

    println!(
        "Rolled up {date}: {} tickets created, avg resolution {}.",
        row.ticket_volume,
        avg_resolution_minutes
            .map(|minutes| format!("{minutes} min"))
            .unwrap_or_else(|| "n/a".to_string()),
    );
    Ok(())
}
