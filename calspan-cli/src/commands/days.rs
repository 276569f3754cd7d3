use anyhow::Result;
use calspan_core::Timespan;
use owo_colors::OwoColorize;

use crate::dates::parse_datetime;

pub fn run(from: &str, to: &str) -> Result<()> {
    let labels = day_labels(from, to)?;

    for label in &labels {
        println!("{}", label);
    }
    println!("{}", format!("{} days", labels.len()).dimmed());

    Ok(())
}

/// One label per local calendar day touched by `[from, to]`.
fn day_labels(from: &str, to: &str) -> Result<Vec<String>> {
    let span = Timespan::from_dates(&parse_datetime(from)?, &parse_datetime(to)?)?;

    Ok(span
        .days_between()
        .iter()
        .map(|day| day.format("%a %b %-d %Y").to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_labels_cover_both_ends() {
        let labels = day_labels("2012-01-30T15:30", "2012-02-02T08:00").unwrap();

        assert_eq!(
            labels,
            vec!["Mon Jan 30 2012", "Tue Jan 31 2012", "Wed Feb 1 2012", "Thu Feb 2 2012"]
        );
    }

    #[test]
    fn test_day_labels_reject_reversed_range() {
        assert!(day_labels("2012-02-02", "2012-01-30").is_err());
    }
}
