//! Declarative policy configuration
//!
//! This is the shape a user writes (YAML or JSON) and the shape read results
//! are flattened back into. Enum-valued fields are kept as strings and
//! resolved at expansion time, intervals use the compact string form, and
//! `splitting_bytes` is a decimal string.
//!
//! Missing fields take the provider defaults.

use super::error::ValidationError;
use super::expand::{parse_enum, parse_splitting_bytes, parse_time_of_day};
use super::interval::validate_interval;
use crate::api::types::{
    BackupSetType, ChangedBlockTracking, Compression, Day, Format, RepeatPeriod, Scheme, VssProvider,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

pub const DEFAULT_ARCHIVE_NAME: &str = "[Machine Name]-[Plan ID]-[Unique ID]a";
pub const DEFAULT_SPLITTING_BYTES: &str = "9223372036854775807";

static ARCHIVE_NAME_RE: OnceLock<Regex> = OnceLock::new();

/// Archive names may not end with a `[Variable]` immediately followed by digits
fn archive_name_regex() -> &'static Regex {
    ARCHIVE_NAME_RE.get_or_init(|| {
        Regex::new(r"\[[^\]]*\]\d+$")
            .unwrap_or_else(|e| panic!("Failed to compile archive name pattern: {}", e))
    })
}

pub fn validate_archive_name(name: &str) -> Result<(), ValidationError> {
    if archive_name_regex().is_match(name) {
        return Err(ValidationError::InvalidArchiveName {
            value: name.to_string(),
        });
    }
    Ok(())
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// A backup policy as configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    pub archive_name: String,
    pub cbt: String,
    pub compression: String,
    pub format: String,
    pub fast_backup_enabled: bool,
    pub multi_volume_snapshotting_enabled: bool,
    pub preserve_file_security_settings: bool,
    pub quiesce_snapshotting_enabled: bool,
    pub silent_mode_enabled: bool,
    pub performance_window_enabled: bool,
    pub splitting_bytes: String,
    pub vss_provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reattempts: Option<RetriesBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm_snapshot_reattempts: Option<RetriesBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionBlock>,
    pub scheduling: SchedulingBlock,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            folder_id: None,
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            cbt: ChangedBlockTracking::DoNotUse.to_string(),
            compression: Compression::Normal.to_string(),
            format: Format::Auto.to_string(),
            fast_backup_enabled: true,
            multi_volume_snapshotting_enabled: true,
            preserve_file_security_settings: true,
            quiesce_snapshotting_enabled: true,
            silent_mode_enabled: true,
            performance_window_enabled: false,
            splitting_bytes: DEFAULT_SPLITTING_BYTES.to_string(),
            vss_provider: VssProvider::Native.to_string(),
            reattempts: Some(RetriesBlock::default()),
            vm_snapshot_reattempts: Some(RetriesBlock::default()),
            retention: None,
            scheduling: SchedulingBlock::default(),
        }
    }
}

/// `reattempts` / `vm_snapshot_reattempts`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetriesBlock {
    pub enabled: bool,
    pub interval: String,
    pub max_attempts: i64,
}

impl Default for RetriesBlock {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: "1m".to_string(),
            max_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionBlock {
    pub after_backup: bool,
    pub rules: Vec<RetentionRuleBlock>,
}

/// Exactly one of `max_age` (non-empty) or `max_count` (> 0) must be set
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionRuleBlock {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub max_age: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub max_count: i64,
    pub repeat_period: Vec<String>,
}

/// `scheduling`
///
/// Backup sets come either from the legacy top-level `execute_by_interval` /
/// `execute_by_time` fields, which describe one implicit set, or from the
/// `backup_sets` list. Both sources may be combined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingBlock {
    pub enabled: bool,
    pub max_parallel_backups: i64,
    pub random_max_delay: String,
    pub scheme: String,
    pub weekly_backup_day: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub execute_by_interval: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execute_by_time: Option<ExecuteByTimeBlock>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backup_sets: Vec<BackupSetBlock>,
}

impl Default for SchedulingBlock {
    fn default() -> Self {
        Self {
            enabled: true,
            max_parallel_backups: 0,
            random_max_delay: "30m".to_string(),
            scheme: Scheme::AlwaysIncremental.to_string(),
            weekly_backup_day: Day::Monday.to_string(),
            execute_by_interval: 0,
            execute_by_time: None,
            backup_sets: Vec::new(),
        }
    }
}

/// One element of `scheduling.backup_sets`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSetBlock {
    /// Seconds since the previous run
    #[serde(skip_serializing_if = "is_zero")]
    pub execute_by_interval: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execute_by_time: Option<ExecuteByTimeBlock>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for BackupSetBlock {
    fn default() -> Self {
        Self {
            execute_by_interval: 0,
            execute_by_time: None,
            kind: BackupSetType::Auto.to_string(),
        }
    }
}

/// `execute_by_time`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteByTimeBlock {
    /// Repeat period: HOURLY, DAILY, WEEKLY or MONTHLY
    #[serde(rename = "type")]
    pub repeat_period: String,
    pub repeat_at: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub repeat_every: String,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub weekdays: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub monthdays: BTreeSet<i64>,
    pub include_last_day_of_month: bool,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub months: BTreeSet<i64>,
}

// =============================================================================
// Validation
// =============================================================================

fn check<T>(errors: &mut Vec<ValidationError>, result: Result<T, ValidationError>) {
    if let Err(e) = result {
        errors.push(e);
    }
}

fn check_range(errors: &mut Vec<ValidationError>, field: &'static str, value: i64, min: i64, max: i64) {
    if value < min || value > max {
        errors.push(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
}

impl PolicyConfig {
    /// Check every field, reporting all problems at once
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        check(&mut errors, validate_archive_name(&self.archive_name));
        check(&mut errors, parse_enum::<ChangedBlockTracking>("cbt", &self.cbt));
        check(&mut errors, parse_enum::<Compression>("compression", &self.compression));
        check(&mut errors, parse_enum::<Format>("format", &self.format));
        check(&mut errors, parse_enum::<VssProvider>("vss_provider", &self.vss_provider));
        check(&mut errors, parse_splitting_bytes(&self.splitting_bytes));

        for retries in [&self.reattempts, &self.vm_snapshot_reattempts].into_iter().flatten() {
            check(&mut errors, validate_interval(&retries.interval));
            check_range(&mut errors, "max_attempts", retries.max_attempts, 0, i64::MAX);
        }

        if let Some(retention) = &self.retention {
            retention.validate_into(&mut errors);
        }

        self.scheduling.validate_into(&mut errors);

        ValidationError::from_all(errors)
    }
}

impl RetentionBlock {
    fn validate_into(&self, errors: &mut Vec<ValidationError>) {
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.max_age.is_empty() == (rule.max_count <= 0) {
                errors.push(ValidationError::RetentionRuleCondition { index });
            }
            check(errors, validate_interval(&rule.max_age));
            if rule.repeat_period.is_empty() {
                errors.push(ValidationError::EmptyRepeatPeriod { index });
            }
            for period in &rule.repeat_period {
                check(errors, parse_enum::<RepeatPeriod>("repeat_period", period));
            }
        }
    }
}

impl SchedulingBlock {
    fn validate_into(&self, errors: &mut Vec<ValidationError>) {
        check_range(errors, "max_parallel_backups", self.max_parallel_backups, 0, i64::MAX);
        check(errors, validate_interval(&self.random_max_delay));
        check(errors, parse_enum::<Scheme>("scheme", &self.scheme));
        check(errors, parse_enum::<Day>("weekly_backup_day", &self.weekly_backup_day));

        let legacy_interval = self.execute_by_interval != 0;
        if legacy_interval && self.execute_by_time.is_some() {
            errors.push(ValidationError::BackupSetSetting);
        }
        check_range(errors, "execute_by_interval", self.execute_by_interval, 0, i64::MAX);
        if let Some(time) = &self.execute_by_time {
            time.validate_into(errors);
        }

        for set in &self.backup_sets {
            if (set.execute_by_interval > 0) == set.execute_by_time.is_some() {
                errors.push(ValidationError::BackupSetSetting);
            }
            check_range(errors, "execute_by_interval", set.execute_by_interval, 0, i64::MAX);
            check(errors, parse_enum::<BackupSetType>("backup_sets.type", &set.kind));
            if let Some(time) = &set.execute_by_time {
                time.validate_into(errors);
            }
        }

        if !legacy_interval && self.execute_by_time.is_none() && self.backup_sets.is_empty() {
            errors.push(ValidationError::NoBackupSets);
        }
    }
}

impl ExecuteByTimeBlock {
    fn validate_into(&self, errors: &mut Vec<ValidationError>) {
        if self.repeat_period.is_empty() {
            errors.push(ValidationError::Required {
                field: "execute_by_time.type",
            });
        } else {
            check(errors, parse_enum::<RepeatPeriod>("execute_by_time.type", &self.repeat_period));
        }
        for at in &self.repeat_at {
            check(errors, parse_time_of_day(at));
        }
        check(errors, validate_interval(&self.repeat_every));
        for day in &self.weekdays {
            check(errors, parse_enum::<Day>("weekdays", day));
        }
        for &day in &self.monthdays {
            check_range(errors, "monthdays", day, 1, 31);
        }
        for &month in &self.months {
            check_range(errors, "months", month, 1, 12);
        }
    }
}
