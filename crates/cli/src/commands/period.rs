//! Day/night classification command

use anyhow::{bail, Result};
use scaler_lib::{schedule, TimePeriod};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{color_status, print_table, OutputFormat};

#[derive(Debug, Serialize)]
struct Classification {
    hour: u32,
    period: TimePeriod,
}

#[derive(Tabled)]
struct PeriodRow {
    #[tabled(rename = "Hour")]
    hour: String,
    #[tabled(rename = "Period")]
    period: String,
}

/// Resolve the hour to classify, defaulting to the host clock
pub fn resolve_hour(hour: Option<u32>) -> Result<u32> {
    match hour {
        Some(h) if h > 23 => bail!("hour must be between 0 and 23, got {}", h),
        Some(h) => Ok(h),
        None => Ok(schedule::current_hour()),
    }
}

/// Print the period an hour falls into
pub fn show_period(hour: Option<u32>, format: OutputFormat) -> Result<()> {
    let hour = resolve_hour(hour)?;
    let classification = Classification {
        hour,
        period: TimePeriod::from_hour(hour),
    };

    let rows = vec![PeriodRow {
        hour: format!("{:02}:00", hour),
        period: color_status(classification.period.as_str()),
    }];
    print_table(&rows, &classification, format);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hour_out_of_range() {
        assert!(resolve_hour(Some(24)).is_err());
        assert_eq!(resolve_hour(Some(23)).unwrap(), 23);
        assert!(resolve_hour(None).unwrap() < 24);
    }
}
