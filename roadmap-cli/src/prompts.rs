use anyhow::Result;
use inquire::validator::Validation;
use inquire::{Confirm, CustomType, Select, Text};

use roadmap_core::models::MAX_ESTIMATED_HOURS;
use roadmap_core::{NewItem, Priority};

const NO_PRIORITY: &str = "(none)";

/// Prompts for whatever the command line left out of a new item.
/// Title and description are required; the rest may be skipped.
pub fn prompt_new_item(mut fields: NewItem, ask_optional: bool) -> Result<NewItem> {
    if fields.title.trim().is_empty() {
        fields.title = Text::new("Title:")
            .with_validator(inquire::required!("Title is required"))
            .prompt()?;
    }

    if fields.description.trim().is_empty() {
        fields.description = Text::new("Description:")
            .with_validator(inquire::required!("Description is required"))
            .prompt()?;
    }

    if !ask_optional {
        return Ok(fields);
    }

    if fields.priority.is_none() {
        let options = vec![NO_PRIORITY, "high", "medium", "low"];
        let choice = Select::new("Priority:", options).prompt()?;
        fields.priority = Priority::parse(choice);
    }

    if fields.category.is_none() {
        let category = Text::new("Category [general]:").prompt()?;
        if !category.trim().is_empty() {
            fields.category = Some(category.trim().to_string());
        }
    }

    if fields.estimated_hours.is_none() {
        fields.estimated_hours = CustomType::<u32>::new("Estimated hours (empty to skip):")
            .with_validator(|hours: &u32| {
                if (1..=MAX_ESTIMATED_HOURS).contains(hours) {
                    Ok(Validation::Valid)
                } else {
                    Ok(Validation::Invalid(
                        format!("Enter a value between 1 and {}", MAX_ESTIMATED_HOURS).into(),
                    ))
                }
            })
            .prompt_skippable()?;
    }

    Ok(fields)
}

/// Asks before a destructive operation; defaults to no
pub fn confirm(message: &str) -> Result<bool> {
    Ok(Confirm::new(message).with_default(false).prompt()?)
}
