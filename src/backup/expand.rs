//! Settings expansion
//!
//! Builds a complete [`PolicySettings`] tree from a [`PolicyConfig`]. Every
//! structural rule is checked here so a request is never sent half-built.

use super::error::ValidationError;
use super::interval::Interval;
use super::schema::{
    validate_archive_name, BackupSetBlock, ExecuteByTimeBlock, PolicyConfig, RetentionBlock,
    RetentionRuleBlock, RetriesBlock, SchedulingBlock,
};
use crate::api::types::{
    ArchiveProperties, BackupSet, BackupSetSetting, BackupSetType, ChangedBlockTracking, Compression,
    Day, Format, PerformanceWindow, PolicySettings, RepeatPeriod, Retention, RetentionCondition,
    RetentionRule, RetriesConfiguration, ScheduleTime, Scheduling, Scheme, SinceLastExecTime,
    Splitting, TimeOfDay, VolumeShadowCopyServiceSettings, VssProvider,
};
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

static TIME_OF_DAY_RE: OnceLock<Regex> = OnceLock::new();

fn time_of_day_regex() -> &'static Regex {
    TIME_OF_DAY_RE.get_or_init(|| {
        Regex::new(r"^(\d{2}):(\d{2})$")
            .unwrap_or_else(|e| panic!("Failed to compile time of day pattern: {}", e))
    })
}

/// Case-insensitive enum lookup; unknown names are an error
pub fn parse_enum<T: FromStr>(field: &'static str, value: &str) -> Result<T, ValidationError> {
    T::from_str(value).map_err(|_| ValidationError::UnknownEnum {
        field,
        value: value.to_string(),
    })
}

/// Parse `"HH:MM"` (24-hour). An empty string yields `None`.
pub fn parse_time_of_day(value: &str) -> Result<Option<TimeOfDay>, ValidationError> {
    if value.is_empty() {
        return Ok(None);
    }

    let invalid = || ValidationError::InvalidTimeOfDay {
        value: value.to_string(),
    };

    let caps = time_of_day_regex().captures(value).ok_or_else(invalid)?;
    let hour: i64 = caps[1].parse().map_err(|_| invalid())?;
    let minute: i64 = caps[2].parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }

    Ok(Some(TimeOfDay { hour, minute }))
}

pub fn expand_time_of_day(value: &str) -> Result<Option<TimeOfDay>, ValidationError> {
    parse_time_of_day(value)
}

/// `splitting_bytes` is a decimal string holding an int64
pub fn parse_splitting_bytes(value: &str) -> Result<i64, ValidationError> {
    value
        .parse::<i64>()
        .map_err(|_| ValidationError::InvalidSplittingBytes {
            value: value.to_string(),
        })
}

pub fn expand_policy_settings(config: &PolicyConfig) -> Result<PolicySettings, ValidationError> {
    let settings = PolicySettings {
        compression: parse_enum::<Compression>("compression", &config.compression)?,
        format: parse_enum::<Format>("format", &config.format)?,
        multi_volume_snapshotting_enabled: config.multi_volume_snapshotting_enabled,
        preserve_file_security_settings: config.preserve_file_security_settings,
        reattempts: expand_retries(config.reattempts.as_ref())?,
        silent_mode_enabled: config.silent_mode_enabled,
        splitting: Some(expand_splitting(&config.splitting_bytes)?),
        vm_snapshot_reattempts: expand_retries(config.vm_snapshot_reattempts.as_ref())?,
        vss: Some(expand_vss(&config.vss_provider)?),
        archive: Some(expand_archive(&config.archive_name)?),
        performance_window: Some(expand_performance_window(config.performance_window_enabled)),
        retention: expand_retention(config.retention.as_ref())?,
        scheduling: Some(expand_scheduling(&config.scheduling)?),
        cbt: parse_enum::<ChangedBlockTracking>("cbt", &config.cbt)?,
        fast_backup_enabled: config.fast_backup_enabled,
        quiesce_snapshotting_enabled: config.quiesce_snapshotting_enabled,
    };

    tracing::debug!("expanded settings for policy {:?}", config.name);
    Ok(settings)
}

pub fn expand_retries(block: Option<&RetriesBlock>) -> Result<Option<RetriesConfiguration>, ValidationError> {
    let Some(block) = block else {
        return Ok(None);
    };

    Ok(Some(RetriesConfiguration {
        enabled: block.enabled,
        interval: Interval::parse(&block.interval)?,
        max_attempts: block.max_attempts,
    }))
}

pub fn expand_splitting(bytes: &str) -> Result<Splitting, ValidationError> {
    Ok(Splitting {
        size: parse_splitting_bytes(bytes)?,
    })
}

pub fn expand_archive(name: &str) -> Result<ArchiveProperties, ValidationError> {
    validate_archive_name(name)?;
    Ok(ArchiveProperties {
        name: name.to_string(),
    })
}

pub fn expand_performance_window(enabled: bool) -> PerformanceWindow {
    PerformanceWindow { enabled }
}

/// VSS is always enabled when configured; only the provider varies
pub fn expand_vss(provider: &str) -> Result<VolumeShadowCopyServiceSettings, ValidationError> {
    Ok(VolumeShadowCopyServiceSettings {
        enabled: true,
        provider: parse_enum::<VssProvider>("vss_provider", provider)?,
    })
}

/// An absent block expands to `None`
pub fn expand_retention(block: Option<&RetentionBlock>) -> Result<Option<Retention>, ValidationError> {
    let Some(block) = block else {
        return Ok(None);
    };

    let rules = block
        .rules
        .iter()
        .enumerate()
        .map(|(index, rule)| expand_retention_rule(index, rule))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Retention {
        rules,
        before_backup: !block.after_backup,
    }))
}

pub fn expand_retention_rule(index: usize, rule: &RetentionRuleBlock) -> Result<RetentionRule, ValidationError> {
    let condition = match (rule.max_age.is_empty(), rule.max_count > 0) {
        (false, false) => {
            let max_age = Interval::parse(&rule.max_age)?
                .ok_or(ValidationError::RetentionRuleCondition { index })?;
            RetentionCondition::MaxAge(max_age)
        }
        (true, true) => RetentionCondition::MaxCount(rule.max_count),
        _ => return Err(ValidationError::RetentionRuleCondition { index }),
    };

    if rule.repeat_period.is_empty() {
        return Err(ValidationError::EmptyRepeatPeriod { index });
    }

    let backup_set = rule
        .repeat_period
        .iter()
        .map(|period| parse_enum::<RepeatPeriod>("repeat_period", period))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RetentionRule { backup_set, condition })
}

pub fn expand_scheduling(block: &SchedulingBlock) -> Result<Scheduling, ValidationError> {
    let mut backup_sets = Vec::with_capacity(block.backup_sets.len() + 1);

    // Legacy top-level fields describe a single implicit backup set
    match (block.execute_by_interval > 0, &block.execute_by_time) {
        (true, Some(_)) => return Err(ValidationError::BackupSetSetting),
        (true, None) => backup_sets.push(BackupSet {
            setting: since_last_exec(block.execute_by_interval),
            kind: BackupSetType::Auto,
        }),
        (false, Some(time)) => backup_sets.push(BackupSet {
            setting: BackupSetSetting::Time(expand_execute_by_time(time)?),
            kind: BackupSetType::Auto,
        }),
        (false, None) => {}
    }

    for set in &block.backup_sets {
        backup_sets.push(expand_backup_set(set)?);
    }

    if backup_sets.is_empty() {
        return Err(ValidationError::NoBackupSets);
    }

    Ok(Scheduling {
        backup_sets,
        enabled: block.enabled,
        max_parallel_backups: block.max_parallel_backups,
        random_max_delay: Interval::parse(&block.random_max_delay)?,
        scheme: parse_enum::<Scheme>("scheme", &block.scheme)?,
        weekly_backup_day: parse_enum::<Day>("weekly_backup_day", &block.weekly_backup_day)?,
    })
}

fn since_last_exec(seconds: i64) -> BackupSetSetting {
    BackupSetSetting::SinceLastExecTime(SinceLastExecTime {
        delay: Interval::seconds(seconds),
    })
}

pub fn expand_backup_set(block: &BackupSetBlock) -> Result<BackupSet, ValidationError> {
    let setting = match (block.execute_by_interval > 0, &block.execute_by_time) {
        (true, None) => since_last_exec(block.execute_by_interval),
        (false, Some(time)) => BackupSetSetting::Time(expand_execute_by_time(time)?),
        _ => return Err(ValidationError::BackupSetSetting),
    };

    Ok(BackupSet {
        setting,
        kind: parse_enum::<BackupSetType>("backup_sets.type", &block.kind)?,
    })
}

pub fn expand_execute_by_time(block: &ExecuteByTimeBlock) -> Result<ScheduleTime, ValidationError> {
    if block.repeat_period.is_empty() {
        return Err(ValidationError::Required {
            field: "execute_by_time.type",
        });
    }

    let mut repeat_at = Vec::with_capacity(block.repeat_at.len());
    for at in &block.repeat_at {
        if let Some(time) = parse_time_of_day(at)? {
            repeat_at.push(time);
        }
    }

    // Names differing only in case parse to the same day
    let mut weekdays = Vec::with_capacity(block.weekdays.len());
    for name in &block.weekdays {
        let day = parse_enum::<Day>("weekdays", name)?;
        if !weekdays.contains(&day) {
            weekdays.push(day);
        }
    }

    Ok(ScheduleTime {
        weekdays,
        repeat_at,
        repeat_every: Interval::parse(&block.repeat_every)?,
        time_from: None,
        time_to: None,
        monthdays: block.monthdays.iter().copied().collect(),
        include_last_day_of_month: block.include_last_day_of_month,
        months: block.months.iter().copied().collect(),
        repeat_period: parse_enum::<RepeatPeriod>("execute_by_time.type", &block.repeat_period)?,
    })
}
