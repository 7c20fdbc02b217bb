use sovereign_core::models::{Country, Project};

use crate::commands::common::{print_json, CliContext};
use crate::error::CliError;

pub async fn run_countries(context: &CliContext, limit: usize, as_json: bool) -> Result<(), CliError> {
    let countries = context.open_store().await?.list_countries(limit).await?;
    if as_json {
        return print_json(&countries);
    }
    if countries.is_empty() {
        println!("No countries mirrored yet; run `sovereign sync`.");
    }
    for line in format_country_lines(&countries) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_projects(context: &CliContext, limit: usize, as_json: bool) -> Result<(), CliError> {
    let projects = context.open_store().await?.list_projects(limit).await?;
    if as_json {
        return print_json(&projects);
    }
    if projects.is_empty() {
        println!("No projects mirrored yet; run `sovereign sync`.");
    }
    for line in format_project_lines(&projects) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_country_lines(countries: &[Country]) -> Vec<String> {
    countries
        .iter()
        .map(|country| {
            format!(
                "{:<4} {:<32} {:<20} {}",
                country.country_code,
                country.country_name,
                country.region.as_deref().unwrap_or("-"),
                country.covenant_status.as_deref().unwrap_or("-")
            )
        })
        .collect()
}

pub fn format_project_lines(projects: &[Project]) -> Vec<String> {
    projects
        .iter()
        .map(|project| {
            let budget = project
                .budget_usd
                .map_or_else(|| "-".to_string(), |budget| format!("${budget:.0}"));
            format!(
                "{:<12} {:<32} {:<16} {:<12} {}",
                project.project_id,
                project.project_name,
                project.sector.as_deref().unwrap_or("-"),
                project.status.as_deref().unwrap_or("-"),
                budget
            )
        })
        .collect()
}
