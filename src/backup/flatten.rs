//! Settings flattening
//!
//! The inverse of [`super::expand`]: turns the settings tree read from the
//! server back into a [`PolicyConfig`]. Read results are trusted to be
//! well-formed, so nothing is validated here beyond the invariants the
//! declarative shape depends on.
//!
//! Backup sets are unordered on the declarative side. Each one carries a
//! structural hash ([`BackupSetBlock::set_hash`]) and the flattened list is
//! sorted by it, so comparing a read result against configuration does not
//! depend on the order the server returned them in.

use super::error::FlattenError;
use super::interval::format_interval;
use super::schema::{
    BackupSetBlock, ExecuteByTimeBlock, PolicyConfig, RetentionBlock, RetentionRuleBlock,
    RetriesBlock, SchedulingBlock, DEFAULT_SPLITTING_BYTES,
};
use crate::api::types::{
    BackupSet, BackupSetSetting, PolicySettings, Retention, RetentionCondition, RetriesConfiguration,
    ScheduleTime, Scheduling, TimeOfDay, VssProvider,
};
use sha2::{Digest, Sha256};

pub fn flatten_policy_settings(settings: &PolicySettings) -> Result<PolicyConfig, FlattenError> {
    let scheduling = settings
        .scheduling
        .as_ref()
        .ok_or(FlattenError::NoBackupSets)?;

    Ok(PolicyConfig {
        name: String::new(),
        folder_id: None,
        archive_name: settings
            .archive
            .as_ref()
            .map(|a| a.name.clone())
            .unwrap_or_default(),
        cbt: settings.cbt.to_string(),
        compression: settings.compression.to_string(),
        format: settings.format.to_string(),
        fast_backup_enabled: settings.fast_backup_enabled,
        multi_volume_snapshotting_enabled: settings.multi_volume_snapshotting_enabled,
        preserve_file_security_settings: settings.preserve_file_security_settings,
        quiesce_snapshotting_enabled: settings.quiesce_snapshotting_enabled,
        silent_mode_enabled: settings.silent_mode_enabled,
        performance_window_enabled: settings
            .performance_window
            .map(|w| w.enabled)
            .unwrap_or(false),
        // Omitted blocks flatten to the declarative defaults
        splitting_bytes: settings
            .splitting
            .map(|s| s.size.to_string())
            .unwrap_or_else(|| DEFAULT_SPLITTING_BYTES.to_string()),
        vss_provider: settings
            .vss
            .map(|v| v.provider)
            .unwrap_or(VssProvider::Native)
            .to_string(),
        reattempts: flatten_retries(settings.reattempts.as_ref()),
        vm_snapshot_reattempts: flatten_retries(settings.vm_snapshot_reattempts.as_ref()),
        retention: flatten_retention(settings.retention.as_ref()),
        scheduling: flatten_scheduling(scheduling)?,
    })
}

/// `None` stays unset rather than becoming an empty block
pub fn flatten_retries(retries: Option<&RetriesConfiguration>) -> Option<RetriesBlock> {
    retries.map(|r| RetriesBlock {
        enabled: r.enabled,
        interval: format_interval(r.interval.as_ref()),
        max_attempts: r.max_attempts,
    })
}

pub fn flatten_retention(retention: Option<&Retention>) -> Option<RetentionBlock> {
    let retention = retention?;

    let rules = retention
        .rules
        .iter()
        .map(|rule| {
            let mut block = RetentionRuleBlock {
                repeat_period: rule.backup_set.iter().map(ToString::to_string).collect(),
                ..Default::default()
            };
            match &rule.condition {
                RetentionCondition::MaxAge(age) => block.max_age = age.format(),
                RetentionCondition::MaxCount(count) => block.max_count = *count,
            }
            block
        })
        .collect();

    Some(RetentionBlock {
        after_backup: !retention.before_backup,
        rules,
    })
}

/// Backup sets always come back in the `backup_sets` list; the legacy
/// top-level fields are left unset.
pub fn flatten_scheduling(scheduling: &Scheduling) -> Result<SchedulingBlock, FlattenError> {
    if scheduling.backup_sets.is_empty() {
        return Err(FlattenError::NoBackupSets);
    }

    let mut backup_sets: Vec<BackupSetBlock> =
        scheduling.backup_sets.iter().map(flatten_backup_set).collect();
    backup_sets.sort_by_cached_key(BackupSetBlock::set_hash);

    Ok(SchedulingBlock {
        enabled: scheduling.enabled,
        max_parallel_backups: scheduling.max_parallel_backups,
        random_max_delay: format_interval(scheduling.random_max_delay.as_ref()),
        scheme: scheduling.scheme.to_string(),
        weekly_backup_day: scheduling.weekly_backup_day.to_string(),
        execute_by_interval: 0,
        execute_by_time: None,
        backup_sets,
    })
}

pub fn flatten_backup_set(set: &BackupSet) -> BackupSetBlock {
    let mut block = BackupSetBlock {
        kind: set.kind.to_string(),
        ..Default::default()
    };

    match &set.setting {
        // Declarative interval is always seconds, whatever unit the server stored
        BackupSetSetting::SinceLastExecTime(since) => {
            block.execute_by_interval = since.delay.normalized_to_seconds().count;
        }
        BackupSetSetting::Time(time) => {
            block.execute_by_time = Some(flatten_execute_by_time(time));
        }
    }

    block
}

pub fn flatten_execute_by_time(time: &ScheduleTime) -> ExecuteByTimeBlock {
    ExecuteByTimeBlock {
        repeat_period: time.repeat_period.to_string(),
        repeat_at: time
            .repeat_at
            .iter()
            .map(|at| flatten_time_of_day(Some(at)))
            .collect(),
        repeat_every: format_interval(time.repeat_every.as_ref()),
        weekdays: time.weekdays.iter().map(ToString::to_string).collect(),
        monthdays: time.monthdays.iter().copied().collect(),
        include_last_day_of_month: time.include_last_day_of_month,
        months: time.months.iter().copied().collect(),
    }
}

pub fn flatten_time_of_day(time: Option<&TimeOfDay>) -> String {
    time.map(|t| format!("{:02}:{:02}", t.hour, t.minute))
        .unwrap_or_default()
}

// =============================================================================
// Set hashing
// =============================================================================

fn hash_canonical(canonical: &str) -> u64 {
    let digest = Sha256::digest(canonical.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

fn join<I, T>(items: I) -> String
where
    I: IntoIterator<Item = T>,
    T: ToString,
{
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

impl ExecuteByTimeBlock {
    /// Canonical form the hash is computed over. Enum names are compared
    /// case-insensitively, so they are upper-cased here.
    fn canonical(&self) -> String {
        let weekdays: std::collections::BTreeSet<String> =
            self.weekdays.iter().map(|d| d.to_ascii_uppercase()).collect();

        format!(
            "type={};repeat_at={};repeat_every={};weekdays={};monthdays={};last_day={};months={}",
            self.repeat_period.to_ascii_uppercase(),
            self.repeat_at.join(","),
            self.repeat_every,
            join(weekdays),
            join(&self.monthdays),
            self.include_last_day_of_month,
            join(&self.months),
        )
    }

    /// Stable structural hash, independent of set iteration order
    pub fn set_hash(&self) -> u64 {
        hash_canonical(&self.canonical())
    }
}

impl BackupSetBlock {
    /// Stable structural hash over the trigger and the backup type
    pub fn set_hash(&self) -> u64 {
        let time = self
            .execute_by_time
            .as_ref()
            .map(ExecuteByTimeBlock::canonical)
            .unwrap_or_default();
        hash_canonical(&format!(
            "kind={};interval={};time={{{}}}",
            self.kind.to_ascii_uppercase(),
            self.execute_by_interval,
            time
        ))
    }
}

/// Compare two backup set lists as multisets of their hashes
pub fn backup_sets_equal(a: &[BackupSetBlock], b: &[BackupSetBlock]) -> bool {
    let hashes = |sets: &[BackupSetBlock]| {
        let mut hashes: Vec<u64> = sets.iter().map(BackupSetBlock::set_hash).collect();
        hashes.sort_unstable();
        hashes
    };
    a.len() == b.len() && hashes(a) == hashes(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{
        BackupSetType, Day, RepeatPeriod, RetentionRule, Scheme, SinceLastExecTime,
    };
    use crate::backup::expand::expand_policy_settings;
    use crate::backup::interval::{Interval, IntervalUnit};
    use std::collections::BTreeSet;

    fn interval_set(delay: Interval) -> BackupSet {
        BackupSet {
            setting: BackupSetSetting::SinceLastExecTime(SinceLastExecTime { delay }),
            kind: BackupSetType::Auto,
        }
    }

    fn scheduling_with(backup_sets: Vec<BackupSet>) -> Scheduling {
        Scheduling {
            backup_sets,
            enabled: true,
            scheme: Scheme::AlwaysIncremental,
            weekly_backup_day: Day::Monday,
            ..Default::default()
        }
    }

    #[test]
    fn test_time_of_day_is_zero_padded() {
        assert_eq!(flatten_time_of_day(Some(&TimeOfDay { hour: 3, minute: 5 })), "03:05");
        assert_eq!(flatten_time_of_day(None), "");
    }

    #[test]
    fn test_retries_none_stays_unset() {
        assert_eq!(flatten_retries(None), None);
        let retries = RetriesConfiguration {
            enabled: true,
            interval: Some(Interval::new(5, IntervalUnit::Minutes)),
            max_attempts: 3,
        };
        assert_eq!(
            flatten_retries(Some(&retries)),
            Some(RetriesBlock {
                enabled: true,
                interval: "5m".into(),
                max_attempts: 3
            })
        );
    }

    #[test]
    fn test_retention_branches_on_condition() {
        let retention = Retention {
            before_backup: true,
            rules: vec![
                RetentionRule {
                    backup_set: vec![RepeatPeriod::Daily, RepeatPeriod::Weekly],
                    condition: RetentionCondition::MaxAge(Interval::new(1, IntervalUnit::Months)),
                },
                RetentionRule {
                    backup_set: vec![RepeatPeriod::Monthly],
                    condition: RetentionCondition::MaxCount(12),
                },
            ],
        };

        let block = flatten_retention(Some(&retention)).unwrap();
        assert!(!block.after_backup);
        assert_eq!(block.rules[0].max_age, "1M");
        assert_eq!(block.rules[0].max_count, 0);
        assert_eq!(block.rules[0].repeat_period, vec!["DAILY", "WEEKLY"]);
        assert_eq!(block.rules[1].max_age, "");
        assert_eq!(block.rules[1].max_count, 12);
    }

    #[test]
    fn test_interval_backup_set_is_seconds() {
        let set = interval_set(Interval::new(2, IntervalUnit::Hours));
        let block = flatten_backup_set(&set);
        assert_eq!(block.execute_by_interval, 7200);
        assert_eq!(block.kind, "TYPE_AUTO");
        assert!(block.execute_by_time.is_none());
    }

    #[test]
    fn test_empty_backup_sets_is_an_error() {
        let err = flatten_scheduling(&scheduling_with(vec![])).unwrap_err();
        assert_eq!(err.to_string(), "expected to have at least one scheduling backup set");

        let settings = PolicySettings::default();
        assert_eq!(flatten_policy_settings(&settings), Err(FlattenError::NoBackupSets));
    }

    #[test]
    fn test_backup_set_order_does_not_matter() {
        let a = interval_set(Interval::seconds(60));
        let b = interval_set(Interval::new(1, IntervalUnit::Days));

        let first = flatten_scheduling(&scheduling_with(vec![a.clone(), b.clone()])).unwrap();
        let second = flatten_scheduling(&scheduling_with(vec![b, a])).unwrap();
        assert_eq!(first.backup_sets, second.backup_sets);
    }

    #[test]
    fn test_set_hash_ignores_case_and_set_order() {
        let upper = ExecuteByTimeBlock {
            repeat_period: "WEEKLY".into(),
            repeat_at: vec!["01:00".into()],
            weekdays: BTreeSet::from(["MONDAY".to_string(), "FRIDAY".to_string()]),
            ..Default::default()
        };
        let lower = ExecuteByTimeBlock {
            repeat_period: "weekly".into(),
            weekdays: BTreeSet::from(["friday".to_string(), "monday".to_string()]),
            ..upper.clone()
        };
        assert_eq!(upper.set_hash(), lower.set_hash());

        let other = ExecuteByTimeBlock {
            repeat_at: vec!["02:00".into()],
            ..upper.clone()
        };
        assert_ne!(upper.set_hash(), other.set_hash());
    }

    #[test]
    fn test_backup_sets_equal() {
        let hourly = BackupSetBlock {
            execute_by_interval: 3600,
            ..Default::default()
        };
        let full = BackupSetBlock {
            execute_by_interval: 3600,
            kind: "TYPE_FULL".into(),
            ..Default::default()
        };

        assert!(backup_sets_equal(&[hourly.clone(), full.clone()], &[full.clone(), hourly.clone()]));
        assert!(!backup_sets_equal(&[hourly.clone()], &[full.clone()]));
        assert!(!backup_sets_equal(&[hourly.clone(), hourly.clone()], &[hourly]));
    }

    #[test]
    fn test_missing_splitting_and_vss_use_defaults() {
        let config = PolicyConfig {
            name: "defaults".into(),
            scheduling: SchedulingBlock {
                backup_sets: vec![BackupSetBlock {
                    execute_by_interval: 3600,
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        let mut settings = expand_policy_settings(&config).unwrap();
        settings.splitting = None;
        settings.vss = None;

        let config = flatten_policy_settings(&settings).unwrap();
        assert_eq!(config.splitting_bytes, DEFAULT_SPLITTING_BYTES);
        assert_eq!(config.vss_provider, "NATIVE");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_execute_by_time_renders_every_field() {
        let time = ScheduleTime {
            weekdays: vec![Day::Monday, Day::Friday],
            repeat_at: vec![TimeOfDay { hour: 4, minute: 5 }, TimeOfDay { hour: 23, minute: 30 }],
            repeat_every: Some(Interval::new(2, IntervalUnit::Hours)),
            monthdays: vec![15, 1],
            include_last_day_of_month: true,
            months: vec![12, 6],
            repeat_period: RepeatPeriod::Monthly,
            ..Default::default()
        };

        let block = flatten_execute_by_time(&time);
        assert_eq!(block.repeat_period, "MONTHLY");
        assert_eq!(block.repeat_at, vec!["04:05", "23:30"]);
        assert_eq!(block.repeat_every, "2h");
        assert_eq!(
            block.weekdays,
            BTreeSet::from(["MONDAY".to_string(), "FRIDAY".to_string()])
        );
        assert_eq!(block.monthdays, BTreeSet::from([1, 15]));
        assert!(block.include_last_day_of_month);
        assert_eq!(block.months, BTreeSet::from([6, 12]));
    }

    #[test]
    fn test_expand_then_flatten_keeps_execute_by_time() {
        let block = ExecuteByTimeBlock {
            repeat_period: "WEEKLY".into(),
            repeat_at: vec!["01:00".into(), "13:45".into()],
            repeat_every: "30m".into(),
            weekdays: BTreeSet::from(["SATURDAY".to_string(), "SUNDAY".to_string()]),
            monthdays: BTreeSet::from([7, 28]),
            include_last_day_of_month: true,
            months: BTreeSet::from([1, 2, 3]),
        };

        let expanded = crate::backup::expand::expand_execute_by_time(&block).unwrap();
        assert_eq!(flatten_execute_by_time(&expanded), block);
    }

    #[test]
    fn test_expand_then_flatten_keeps_scalars() {
        let config = PolicyConfig {
            name: "nightly".into(),
            compression: "HIGH".into(),
            format: "VERSION_12".into(),
            cbt: "ENABLE_AND_USE".into(),
            fast_backup_enabled: false,
            multi_volume_snapshotting_enabled: true,
            preserve_file_security_settings: false,
            quiesce_snapshotting_enabled: true,
            silent_mode_enabled: false,
            performance_window_enabled: true,
            splitting_bytes: "1073741824".into(),
            archive_name: "[Machine Name]-nightly".into(),
            scheduling: SchedulingBlock {
                backup_sets: vec![BackupSetBlock {
                    execute_by_time: Some(ExecuteByTimeBlock {
                        repeat_period: "DAILY".into(),
                        repeat_at: vec!["03:30".into()],
                        ..Default::default()
                    }),
                    kind: "TYPE_INCREMENTAL".into(),
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        };

        let flat = flatten_policy_settings(&expand_policy_settings(&config).unwrap()).unwrap();

        assert_eq!(flat.compression, config.compression);
        assert_eq!(flat.format, config.format);
        assert_eq!(flat.cbt, config.cbt);
        assert_eq!(flat.fast_backup_enabled, config.fast_backup_enabled);
        assert_eq!(flat.multi_volume_snapshotting_enabled, config.multi_volume_snapshotting_enabled);
        assert_eq!(flat.preserve_file_security_settings, config.preserve_file_security_settings);
        assert_eq!(flat.quiesce_snapshotting_enabled, config.quiesce_snapshotting_enabled);
        assert_eq!(flat.silent_mode_enabled, config.silent_mode_enabled);
        assert_eq!(flat.performance_window_enabled, config.performance_window_enabled);
        assert_eq!(flat.splitting_bytes, config.splitting_bytes);
        assert_eq!(flat.archive_name, config.archive_name);
        assert_eq!(flat.vss_provider, config.vss_provider);
        assert_eq!(flat.reattempts, config.reattempts);
        assert_eq!(flat.scheduling.random_max_delay, config.scheduling.random_max_delay);
        assert!(backup_sets_equal(
            &flat.scheduling.backup_sets,
            &config.scheduling.backup_sets
        ));
    }
}
