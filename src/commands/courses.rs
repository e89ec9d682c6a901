use anyhow::Result;
use chrono::{Datelike, Local};
use clap::ArgMatches;

use crate::commands::session::{connect, forget_rejected_session};
use crate::core::courses::{list_courses, started_in};
use crate::core::{CancelFlag, Config};
use crate::error::UforaError;
use crate::ui::{self, Table};

/// List courses and remember them so later commands can use their ids
pub async fn execute(matches: &ArgMatches, cancel_flag: CancelFlag) -> Result<()> {
    let show_all = matches.get_flag("all");
    let mut config = Config::load()?;
    let client = connect(&config, cancel_flag).await?;

    let courses = match list_courses(&client).await {
        Ok(courses) => courses,
        Err(e) => {
            forget_rejected_session(&e);
            return Err(UforaError::from(e).into());
        }
    };

    if courses.is_empty() {
        ui::warn("No active courses found.");
        return Ok(());
    }

    let year = Local::now().year();
    let listed = if show_all {
        courses
    } else {
        started_in(&courses, year)
    };

    if listed.is_empty() {
        ui::warn(&format!("No courses started in {} found.", year));
        ui::dimmed("Use 'ufora courses --all' to list every active course.");
        return Ok(());
    }

    let mut table = Table::new(["ID", "Course"]);
    for (index, course) in listed.iter().enumerate() {
        table.add_row([(index + 1).to_string(), course.title.clone()]);
    }

    println!();
    if show_all {
        ui::bold("Your active courses");
    } else {
        ui::bold(&format!("Your courses started in {}", year));
    }
    table.print();
    println!();

    config.courses = listed;
    config.save()?;
    Ok(())
}
