use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::debug;

use crate::{SchedulerError, SchedulerResult};

/// CRON表达式解析和调度工具
///
/// 表达式采用7字段语法：秒 分 时 日 月 周 [年]。
#[derive(Debug, Clone)]
pub struct CronScheduler {
    expression: String,
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        if cron_expr.trim().is_empty() {
            return Err(SchedulerError::InvalidCron {
                expr: cron_expr.to_string(),
                message: "表达式不能为空".to_string(),
            });
        }

        let normalized = Self::normalize(cron_expr);
        let schedule = Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            expression: cron_expr.trim().to_string(),
            schedule,
        })
    }

    /// `?` 在日/周字段中表示“不指定”，等价于 `*`
    fn normalize(cron_expr: &str) -> String {
        cron_expr
            .split_whitespace()
            .map(|field| if field == "?" { "*" } else { field })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 原始表达式
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 获取严格晚于 `from` 的下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> SchedulerResult<()> {
        Self::new(cron_expr).map(|_| ())
    }

    /// 生成人类可读的执行计划描述
    pub fn describe(&self) -> String {
        let normalized = Self::normalize(&self.expression);
        let fields: Vec<&str> = normalized.split_whitespace().collect();
        if fields.len() < 6 {
            return self.get_frequency_description();
        }

        let (sec, min, hour, dom, month, dow) =
            (fields[0], fields[1], fields[2], fields[3], fields[4], fields[5]);
        let every_day = dom == "*" && month == "*" && dow == "*";

        if every_day {
            if let Some(step) = step_of(sec) {
                if min == "*" && hour == "*" {
                    return format!("每{step}秒");
                }
            }
            if sec == "*" && min == "*" && hour == "*" {
                return "每秒".to_string();
            }
            if is_zero(sec) {
                if let Some(step) = step_of(min) {
                    if hour == "*" {
                        return format!("每{step}分钟");
                    }
                }
                if min == "*" && hour == "*" {
                    return "每分钟".to_string();
                }
                if is_zero(min) {
                    if let Some(step) = step_of(hour) {
                        return format!("每{step}小时");
                    }
                    if hour == "*" {
                        return "每小时".to_string();
                    }
                }
            }
        }

        if let Some(time) = time_of_day(sec, min, hour) {
            if every_day {
                return format!("每天 {time}");
            }
            if dom == "*" && month == "*" {
                return format!("每周{} {time}", describe_day_of_week(dow));
            }
            if dow == "*" && month == "*" && dom.parse::<u32>().is_ok() {
                return format!("每月{dom}日 {time}");
            }
        }

        self.get_frequency_description()
    }

    /// 获取任务的执行频率描述
    pub fn get_frequency_description(&self) -> String {
        let upcoming = self.upcoming_times(Utc::now(), 2);
        if upcoming.len() >= 2 {
            let interval = upcoming[1] - upcoming[0];
            let seconds = interval.num_seconds();

            match seconds {
                s if s < 60 => format!("每{s}秒"),
                s if s < 3600 => format!("每{}分钟", s / 60),
                s if s < 86400 => format!("每{}小时", s / 3600),
                s if s < 604800 => format!("每{}天", s / 86400),
                s => format!("每{}周", s / 604800),
            }
        } else {
            debug!("表达式 {} 的后续执行时间不足，无法确定频率", self.expression);
            "无法确定频率".to_string()
        }
    }

    /// 计算下次执行时间距离现在的时长
    pub fn time_until_next_execution(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.schedule.after(&now).next().map(|next| next - now)
    }
}

fn step_of(field: &str) -> Option<u32> {
    let (base, step) = field.split_once('/')?;
    if base == "*" || base == "0" {
        step.parse().ok()
    } else {
        None
    }
}

fn is_zero(field: &str) -> bool {
    field == "0" || field == "00"
}

fn time_of_day(sec: &str, min: &str, hour: &str) -> Option<String> {
    let s: u32 = sec.parse().ok()?;
    let m: u32 = min.parse().ok()?;
    let h: u32 = hour.parse().ok()?;
    Some(format!("{h:02}:{m:02}:{s:02}"))
}

fn describe_day_of_week(dow: &str) -> String {
    dow.split(',')
        .map(|day| match day.to_ascii_uppercase().as_str() {
            "1" | "SUN" => "日".to_string(),
            "2" | "MON" => "一".to_string(),
            "3" | "TUE" => "二".to_string(),
            "4" | "WED" => "三".to_string(),
            "5" | "THU" => "四".to_string(),
            "6" | "FRI" => "五".to_string(),
            "7" | "SAT" => "六".to_string(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("、")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_blank_expression_rejected() {
        assert!(CronScheduler::new("").is_err());
        assert!(CronScheduler::new("   ").is_err());
    }

    #[test]
    fn test_invalid_expression_rejected() {
        let err = CronScheduler::new("not a cron").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
    }

    #[test]
    fn test_question_mark_accepted() {
        let cron = CronScheduler::new("0/1 * * * * ?").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let next = cron.next_execution_time(from).unwrap();
        assert_eq!(next, from + Duration::seconds(1));
    }

    #[test]
    fn test_upcoming_times_daily() {
        let cron = CronScheduler::new("0 30 2 * * ?").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap();
        let times = cron.upcoming_times(from, 2);
        assert_eq!(times[0], Utc.with_ymd_and_hms(2024, 1, 2, 2, 30, 0).unwrap());
        assert_eq!(times[1], Utc.with_ymd_and_hms(2024, 1, 3, 2, 30, 0).unwrap());
    }

    #[test]
    fn test_describe_common_shapes() {
        assert_eq!(CronScheduler::new("0/5 * * * * ?").unwrap().describe(), "每5秒");
        assert_eq!(CronScheduler::new("0 */15 * * * ?").unwrap().describe(), "每15分钟");
        assert_eq!(CronScheduler::new("0 0 */2 * * ?").unwrap().describe(), "每2小时");
        assert_eq!(CronScheduler::new("0 0 * * * ?").unwrap().describe(), "每小时");
        assert_eq!(CronScheduler::new("0 30 2 * * ?").unwrap().describe(), "每天 02:30:00");
        assert_eq!(CronScheduler::new("0 0 9 ? * MON").unwrap().describe(), "每周一 09:00:00");
        assert_eq!(CronScheduler::new("0 0 1 15 * ?").unwrap().describe(), "每月15日 01:00:00");
    }

    #[test]
    fn test_expression_is_kept_verbatim() {
        let cron = CronScheduler::new("  0/1 * * * * ?  ").unwrap();
        assert_eq!(cron.expression(), "0/1 * * * * ?");
    }
}
