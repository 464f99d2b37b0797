//! Wire types of the Cloud Backup API
//!
//! These follow the proto3 JSON mapping used by the REST gateway: camelCase
//! field names, enums by name, int64 values as decimal strings, and default
//! values omitted. Oneof groups are Rust enums flattened into their parent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use crate::backup::interval::{Interval, IntervalUnit};

/// int64 as a decimal string; numbers are accepted on input
pub mod int64 {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub(super) enum Repr {
        Str(String),
        Num(i64),
    }

    impl Repr {
        pub(super) fn into_i64<E: de::Error>(self) -> Result<i64, E> {
            match self {
                Repr::Str(s) => s.parse().map_err(de::Error::custom),
                Repr::Num(n) => Ok(n),
            }
        }
    }

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        Repr::deserialize(deserializer)?.into_i64()
    }
}

/// Repeated int64, same encoding as [`int64`]
pub mod int64_vec {
    use super::int64::Repr;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[i64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&value.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<i64>, D::Error> {
        Vec::<Repr>::deserialize(deserializer)?
            .into_iter()
            .map(Repr::into_i64)
            .collect()
    }
}

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Compression {
    #[default]
    #[serde(rename = "COMPRESSION_UNSPECIFIED")]
    #[strum(serialize = "COMPRESSION_UNSPECIFIED")]
    Unspecified,
    Normal,
    High,
    Max,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Format {
    #[default]
    #[serde(rename = "FORMAT_UNSPECIFIED")]
    #[strum(serialize = "FORMAT_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "VERSION_11")]
    #[strum(serialize = "VERSION_11")]
    Version11,
    #[serde(rename = "VERSION_12")]
    #[strum(serialize = "VERSION_12")]
    Version12,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ChangedBlockTracking {
    #[default]
    #[serde(rename = "CHANGED_BLOCK_TRACKING_UNSPECIFIED")]
    #[strum(serialize = "CHANGED_BLOCK_TRACKING_UNSPECIFIED")]
    Unspecified,
    UseIfEnabled,
    EnableAndUse,
    DoNotUse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum VssProvider {
    #[default]
    #[serde(rename = "VSS_PROVIDER_UNSPECIFIED")]
    #[strum(serialize = "VSS_PROVIDER_UNSPECIFIED")]
    Unspecified,
    Native,
    TargetSystemDefined,
}

/// Period a backup set or a retention rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum RepeatPeriod {
    #[default]
    #[serde(rename = "REPEATE_PERIOD_UNSPECIFIED")]
    #[strum(serialize = "REPEATE_PERIOD_UNSPECIFIED")]
    Unspecified,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Day {
    #[default]
    #[serde(rename = "DAY_UNSPECIFIED")]
    #[strum(serialize = "DAY_UNSPECIFIED")]
    Unspecified,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Scheme {
    #[default]
    #[serde(rename = "SCHEME_UNSPECIFIED")]
    #[strum(serialize = "SCHEME_UNSPECIFIED")]
    Unspecified,
    Simple,
    AlwaysFull,
    AlwaysIncremental,
    WeeklyIncremental,
    WeeklyFullDailyIncremental,
    Custom,
    Cdp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum BackupSetType {
    #[default]
    #[serde(rename = "TYPE_UNSPECIFIED")]
    #[strum(serialize = "TYPE_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "TYPE_AUTO")]
    #[strum(serialize = "TYPE_AUTO")]
    Auto,
    #[serde(rename = "TYPE_FULL")]
    #[strum(serialize = "TYPE_FULL")]
    Full,
    #[serde(rename = "TYPE_INCREMENTAL")]
    #[strum(serialize = "TYPE_INCREMENTAL")]
    Incremental,
    #[serde(rename = "TYPE_DIFFERENTIAL")]
    #[strum(serialize = "TYPE_DIFFERENTIAL")]
    Differential,
}

// =============================================================================
// Settings tree
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TimeOfDay {
    #[serde(default, with = "int64")]
    pub hour: i64,
    #[serde(default, with = "int64")]
    pub minute: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetriesConfiguration {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
    #[serde(default, with = "int64")]
    pub max_attempts: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Splitting {
    #[serde(default, with = "int64")]
    pub size: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeShadowCopyServiceSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub provider: VssProvider,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArchiveProperties {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PerformanceWindow {
    #[serde(default)]
    pub enabled: bool,
}

/// Which backups a retention rule keeps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RetentionCondition {
    MaxAge(Interval),
    MaxCount(#[serde(with = "int64")] i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionRule {
    #[serde(default)]
    pub backup_set: Vec<RepeatPeriod>,
    #[serde(flatten)]
    pub condition: RetentionCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retention {
    #[serde(default)]
    pub rules: Vec<RetentionRule>,
    #[serde(default)]
    pub before_backup: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTime {
    #[serde(default)]
    pub weekdays: Vec<Day>,
    #[serde(default)]
    pub repeat_at: Vec<TimeOfDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_every: Option<Interval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_from: Option<TimeOfDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to: Option<TimeOfDay>,
    #[serde(default, with = "int64_vec")]
    pub monthdays: Vec<i64>,
    #[serde(default)]
    pub include_last_day_of_month: bool,
    #[serde(default, with = "int64_vec")]
    pub months: Vec<i64>,
    #[serde(rename = "type", default)]
    pub repeat_period: RepeatPeriod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinceLastExecTime {
    pub delay: Interval,
}

/// How a backup set is triggered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackupSetSetting {
    Time(ScheduleTime),
    SinceLastExecTime(SinceLastExecTime),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSet {
    #[serde(flatten)]
    pub setting: BackupSetSetting,
    #[serde(rename = "type", default)]
    pub kind: BackupSetType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scheduling {
    #[serde(default)]
    pub backup_sets: Vec<BackupSet>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, with = "int64")]
    pub max_parallel_backups: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_max_delay: Option<Interval>,
    #[serde(default)]
    pub scheme: Scheme,
    #[serde(default)]
    pub weekly_backup_day: Day,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySettings {
    #[serde(default)]
    pub compression: Compression,
    #[serde(default)]
    pub format: Format,
    #[serde(default)]
    pub multi_volume_snapshotting_enabled: bool,
    #[serde(default)]
    pub preserve_file_security_settings: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reattempts: Option<RetriesConfiguration>,
    #[serde(default)]
    pub silent_mode_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splitting: Option<Splitting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_snapshot_reattempts: Option<RetriesConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vss: Option<VolumeShadowCopyServiceSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_window: Option<PerformanceWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<Retention>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling: Option<Scheduling>,
    #[serde(default)]
    pub cbt: ChangedBlockTracking,
    #[serde(default)]
    pub fast_backup_enabled: bool,
    #[serde(default)]
    pub quiesce_snapshotting_enabled: bool,
}

// =============================================================================
// Resources and requests
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub settings: Option<PolicySettings>,
    #[serde(default)]
    pub folder_id: String,
}

/// Application of a policy to a compute instance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyApplication {
    #[serde(default)]
    pub policy_id: String,
    #[serde(default)]
    pub compute_instance_id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_processing: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPoliciesResponse {
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListApplicationsResponse {
    #[serde(default)]
    pub policy_applications: Vec<PolicyApplication>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListActivatedProvidersResponse {
    #[serde(default)]
    pub folder_id: String,
    #[serde(default)]
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePolicyRequest {
    pub folder_id: String,
    pub name: String,
    pub settings: PolicySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePolicyRequest {
    pub policy_id: String,
    pub settings: PolicySettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeInstanceRequest {
    pub compute_instance_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_enum_names_are_case_insensitive() {
        assert_eq!(Scheme::from_str("always_incremental").unwrap(), Scheme::AlwaysIncremental);
        assert_eq!(Day::from_str("Monday").unwrap(), Day::Monday);
        assert_eq!(Format::from_str("version_12").unwrap(), Format::Version12);
        assert_eq!(BackupSetType::from_str("type_full").unwrap(), BackupSetType::Full);
        assert!(Scheme::from_str("SOMETIMES").is_err());
    }

    #[test]
    fn test_enum_display_matches_wire_name() {
        assert_eq!(Format::Version11.to_string(), "VERSION_11");
        assert_eq!(BackupSetType::Differential.to_string(), "TYPE_DIFFERENTIAL");
        assert_eq!(ChangedBlockTracking::DoNotUse.to_string(), "DO_NOT_USE");
        assert_eq!(
            serde_json::to_value(Format::Version11).unwrap(),
            json!("VERSION_11")
        );
    }

    #[test]
    fn test_retention_rule_oneof() {
        let rule: RetentionRule = serde_json::from_value(json!({
            "backupSet": ["DAILY"],
            "maxCount": "7"
        }))
        .unwrap();
        assert_eq!(rule.condition, RetentionCondition::MaxCount(7));
        assert_eq!(rule.backup_set, vec![RepeatPeriod::Daily]);

        let rule: RetentionRule = serde_json::from_value(json!({
            "backupSet": ["WEEKLY"],
            "maxAge": {"type": "DAYS", "count": "5"}
        }))
        .unwrap();
        assert_eq!(
            rule.condition,
            RetentionCondition::MaxAge(Interval::new(5, IntervalUnit::Days))
        );
    }

    #[test]
    fn test_backup_set_oneof() {
        let set: BackupSet = serde_json::from_value(json!({
            "sinceLastExecTime": {"delay": {"type": "HOURS", "count": "1"}},
            "type": "TYPE_FULL"
        }))
        .unwrap();
        assert_eq!(set.kind, BackupSetType::Full);
        assert!(matches!(set.setting, BackupSetSetting::SinceLastExecTime(_)));

        let set: BackupSet = serde_json::from_value(json!({
            "time": {
                "weekdays": ["MONDAY"],
                "repeatAt": [{"hour": "3", "minute": "30"}],
                "monthdays": ["1", 15],
                "type": "WEEKLY"
            }
        }))
        .unwrap();
        assert_eq!(set.kind, BackupSetType::Unspecified);
        let BackupSetSetting::Time(time) = set.setting else {
            panic!("expected time setting");
        };
        assert_eq!(time.repeat_at, vec![TimeOfDay { hour: 3, minute: 30 }]);
        assert_eq!(time.monthdays, vec![1, 15]);
        assert_eq!(time.repeat_period, RepeatPeriod::Weekly);
    }

    #[test]
    fn test_settings_defaults_when_fields_omitted() {
        let settings: PolicySettings = serde_json::from_value(json!({})).unwrap();
        assert_eq!(settings, PolicySettings::default());
    }

    #[test]
    fn test_zero_count_intervals_decode() {
        let settings: PolicySettings = serde_json::from_value(json!({
            "scheduling": {
                "randomMaxDelay": {"type": "MINUTES"},
                "backupSets": [{
                    "time": {"type": "HOURLY", "repeatEvery": {"type": "HOURS"}},
                    "type": "TYPE_AUTO"
                }]
            }
        }))
        .unwrap();

        let scheduling = settings.scheduling.unwrap();
        assert_eq!(
            scheduling.random_max_delay,
            Some(Interval::new(0, IntervalUnit::Minutes))
        );
        let BackupSetSetting::Time(time) = &scheduling.backup_sets[0].setting else {
            panic!("expected a time backup set");
        };
        assert_eq!(time.repeat_every, Some(Interval::new(0, IntervalUnit::Hours)));
    }

    #[test]
    fn test_splitting_size_is_string_on_wire() {
        let value = serde_json::to_value(Splitting { size: 1024 }).unwrap();
        assert_eq!(value, json!({"size": "1024"}));
    }
}
