use std::time::Duration;

use super::JobDataMap;
use crate::{SchedulerError, SchedulerResult};

/// 重试计数在任务参数中的键
pub const COUNT_KEY: &str = "retry.count";

const MAX_RETRIES_KEY: &str = "retry.maxRetries";
const BACKOFF_TYPE_KEY: &str = "retry.backoff";
const DELAY_MS_KEY: &str = "retry.delayMs";
const INITIAL_DELAY_MS_KEY: &str = "retry.initialDelayMs";
const MULTIPLIER_KEY: &str = "retry.multiplier";

const BACKOFF_FIXED: &str = "FIXED";
const BACKOFF_EXPONENTIAL: &str = "EXPONENTIAL";

/// 类型标记缺失或无法识别时使用的固定延迟
pub const DEFAULT_FIXED_DELAY: Duration = Duration::from_secs(10);

/// 指数退避的上限，防止时间计算溢出
const MAX_BACKOFF: Duration = Duration::from_secs(365 * 24 * 3600);

/// 退避策略
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    Fixed { delay: Duration },
    Exponential { initial_delay: Duration, multiplier: f64 },
}

impl BackoffStrategy {
    pub fn fixed(delay: Duration) -> Self {
        BackoffStrategy::Fixed { delay }
    }

    pub fn exponential(initial_delay: Duration, multiplier: f64) -> SchedulerResult<Self> {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(SchedulerError::InvalidRetryPolicy(format!(
                "退避倍数必须为正数: {multiplier}"
            )));
        }
        Ok(BackoffStrategy::Exponential {
            initial_delay,
            multiplier,
        })
    }

    /// 第 `attempt` 次重试（从1开始）前的等待时长
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed { delay } => *delay,
            BackoffStrategy::Exponential {
                initial_delay,
                multiplier,
            } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let secs = initial_delay.as_secs_f64() * multiplier.powi(exponent);
                if !secs.is_finite() || secs >= MAX_BACKOFF.as_secs_f64() {
                    MAX_BACKOFF
                } else {
                    Duration::from_secs_f64(secs.max(0.0))
                }
            }
        }
    }
}

/// 重试策略
///
/// 任务存储只接受原始类型参数，因此策略以“类型标记 + 数值字段”的形式
/// 扁平化写入任务参数表，每次做重试决策时再从参数表还原。
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: BackoffStrategy,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: BackoffStrategy) -> SchedulerResult<Self> {
        if let BackoffStrategy::Exponential { multiplier, .. } = &backoff {
            if !multiplier.is_finite() || *multiplier <= 0.0 {
                return Err(SchedulerError::InvalidRetryPolicy(format!(
                    "退避倍数必须为正数: {multiplier}"
                )));
            }
        }
        Ok(Self {
            max_retries,
            backoff,
        })
    }

    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: BackoffStrategy::fixed(delay),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff(&self) -> &BackoffStrategy {
        &self.backoff
    }

    /// 将策略写入参数表
    pub fn encode(&self, data: &mut JobDataMap) {
        data.put(MAX_RETRIES_KEY, i64::from(self.max_retries));
        match &self.backoff {
            BackoffStrategy::Fixed { delay } => {
                data.put(BACKOFF_TYPE_KEY, BACKOFF_FIXED);
                data.put(DELAY_MS_KEY, duration_to_ms(*delay));
            }
            BackoffStrategy::Exponential {
                initial_delay,
                multiplier,
            } => {
                data.put(BACKOFF_TYPE_KEY, BACKOFF_EXPONENTIAL);
                data.put(INITIAL_DELAY_MS_KEY, duration_to_ms(*initial_delay));
                data.put(MULTIPLIER_KEY, *multiplier);
            }
        }
    }

    /// 从参数表还原策略；没有最大重试次数字段时表示任务未配置重试
    pub fn decode(data: &JobDataMap) -> SchedulerResult<Option<Self>> {
        let Some(max_retries) = data.get_long(MAX_RETRIES_KEY) else {
            return Ok(None);
        };
        let max_retries = u32::try_from(max_retries).map_err(|_| {
            SchedulerError::InvalidRetryPolicy(format!("最大重试次数无效: {max_retries}"))
        })?;

        let backoff = match data.get_string(BACKOFF_TYPE_KEY) {
            Some(BACKOFF_EXPONENTIAL) => {
                let initial_delay = read_delay(data, INITIAL_DELAY_MS_KEY)?.unwrap_or(DEFAULT_FIXED_DELAY);
                let multiplier = data.get_double(MULTIPLIER_KEY).unwrap_or(2.0);
                BackoffStrategy::exponential(initial_delay, multiplier)?
            }
            Some(BACKOFF_FIXED) => {
                BackoffStrategy::fixed(read_delay(data, DELAY_MS_KEY)?.unwrap_or(DEFAULT_FIXED_DELAY))
            }
            _ => BackoffStrategy::fixed(DEFAULT_FIXED_DELAY),
        };

        Self::new(max_retries, backoff).map(Some)
    }
}

/// 读取参数表中的重试计数，缺失或非法时视为0
pub fn retry_count(data: &JobDataMap) -> u32 {
    data.get_long(COUNT_KEY)
        .and_then(|count| u32::try_from(count).ok())
        .unwrap_or(0)
}

fn duration_to_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn read_delay(data: &JobDataMap, key: &str) -> SchedulerResult<Option<Duration>> {
    match data.get_long(key) {
        Some(ms) if ms < 0 => Err(SchedulerError::InvalidRetryPolicy(format!(
            "延迟不能为负数: {key}={ms}"
        ))),
        Some(ms) => Ok(Some(Duration::from_millis(ms as u64))),
        None => Ok(None),
    }
}
