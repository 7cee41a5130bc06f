use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use scheduler_core::traits::{IdGenerator, ParsedId};
use scheduler_core::{SchedulerError, SchedulerResult};

/// 自定义纪元：2024-01-01T00:00:00Z
const EPOCH_MS: i64 = 1_704_067_200_000;

const MACHINE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_MACHINE_ID: u16 = (1 << MACHINE_BITS) - 1;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

/// 13位base36足以容纳u64，定长编码保证字符串顺序与数值顺序一致
const ENCODED_LEN: usize = 13;
const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// 雪花ID生成器
///
/// 64位布局：41位毫秒时间戳 | 10位机器ID | 12位序列号。
/// 时间戳与序列号打包在同一个原子变量中，通过CAS推进，无需加锁。
/// 同一毫秒内序列号耗尽或时钟回拨时，借用下一毫秒继续生成。
#[derive(Debug)]
pub struct SnowflakeIdGenerator {
    machine_id: u16,
    state: AtomicU64,
}

impl SnowflakeIdGenerator {
    pub fn new(machine_id: u16) -> SchedulerResult<Self> {
        if machine_id > MAX_MACHINE_ID {
            return Err(SchedulerError::Configuration(format!(
                "机器ID必须在0-{MAX_MACHINE_ID}之间: {machine_id}"
            )));
        }
        Ok(Self {
            machine_id,
            state: AtomicU64::new(0),
        })
    }

    /// 由主机名推导机器ID
    pub fn from_hostname() -> Self {
        let machine_id = match hostname::get() {
            Ok(name) => {
                let name = name.to_string_lossy();
                let id = fnv1a(name.as_bytes()) % (u64::from(MAX_MACHINE_ID) + 1);
                debug!("根据主机名 {} 推导机器ID: {}", name, id);
                id as u16
            }
            Err(e) => {
                warn!("获取主机名失败，使用机器ID 0: {}", e);
                0
            }
        };
        Self {
            machine_id,
            state: AtomicU64::new(0),
        }
    }

    pub fn machine_id(&self) -> u16 {
        self.machine_id
    }

    /// 生成原始64位ID
    pub fn next_raw(&self) -> u64 {
        loop {
            let now = current_millis();
            let prev = self.state.load(Ordering::Acquire);
            let prev_ts = prev >> SEQUENCE_BITS;
            let prev_seq = prev & MAX_SEQUENCE;

            let (ts, seq) = if now > prev_ts {
                (now, 0)
            } else if prev_seq < MAX_SEQUENCE {
                (prev_ts, prev_seq + 1)
            } else {
                (prev_ts + 1, 0)
            };

            let next = (ts << SEQUENCE_BITS) | seq;
            if self
                .state
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return (ts << (MACHINE_BITS + SEQUENCE_BITS))
                    | (u64::from(self.machine_id) << SEQUENCE_BITS)
                    | seq;
            }
        }
    }

    pub fn decompose(raw: u64) -> SchedulerResult<ParsedId> {
        let seq = (raw & MAX_SEQUENCE) as u16;
        let machine_id = ((raw >> SEQUENCE_BITS) & u64::from(MAX_MACHINE_ID)) as u16;
        let ts = (raw >> (MACHINE_BITS + SEQUENCE_BITS)) as i64;
        let timestamp: DateTime<Utc> = Utc
            .timestamp_millis_opt(EPOCH_MS + ts)
            .single()
            .ok_or_else(|| SchedulerError::InvalidArgument(format!("ID时间戳越界: {raw}")))?;

        Ok(ParsedId {
            machine_id,
            sequence: seq,
            timestamp,
        })
    }
}

impl IdGenerator for SnowflakeIdGenerator {
    fn next_id(&self) -> String {
        encode_base36(self.next_raw())
    }

    fn parse(&self, id: &str) -> SchedulerResult<ParsedId> {
        let raw = decode_base36(id)?;
        Self::decompose(raw)
    }
}

fn current_millis() -> u64 {
    let elapsed = Utc::now().timestamp_millis() - EPOCH_MS;
    u64::try_from(elapsed).unwrap_or(0)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn encode_base36(mut value: u64) -> String {
    let mut buf = [b'0'; ENCODED_LEN];
    for slot in buf.iter_mut().rev() {
        *slot = ALPHABET[(value % 36) as usize];
        value /= 36;
    }
    // ALPHABET只包含ASCII字符
    String::from_utf8_lossy(&buf).into_owned()
}

fn decode_base36(id: &str) -> SchedulerResult<u64> {
    if id.len() != ENCODED_LEN {
        return Err(SchedulerError::InvalidArgument(format!("ID长度无效: {id}")));
    }
    id.bytes().try_fold(0u64, |acc, byte| {
        let digit = match byte {
            b'0'..=b'9' => u64::from(byte - b'0'),
            b'a'..=b'z' => u64::from(byte - b'a') + 10,
            _ => {
                return Err(SchedulerError::InvalidArgument(format!("ID包含非法字符: {id}")));
            }
        };
        acc.checked_mul(36)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| SchedulerError::InvalidArgument(format!("ID数值溢出: {id}")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let generator = SnowflakeIdGenerator::new(7).unwrap();
        let ids: Vec<String> = (0..10_000).map(|_| generator.next_id()).collect();

        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());

        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(sorted, ids);
    }

    #[test]
    fn test_parse_round_trip() {
        let generator = SnowflakeIdGenerator::new(42).unwrap();
        let before = Utc::now() - chrono::Duration::milliseconds(1);
        let id = generator.next_id();
        let parsed = generator.parse(&id).unwrap();

        assert_eq!(id.len(), ENCODED_LEN);
        assert_eq!(parsed.machine_id, 42);
        assert!(parsed.timestamp >= before);
        assert!(parsed.timestamp <= Utc::now() + chrono::Duration::seconds(5));
    }

    #[test]
    fn test_ids_are_url_safe() {
        let generator = SnowflakeIdGenerator::new(1).unwrap();
        let id = generator.next_id();
        assert!(id.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let generator = SnowflakeIdGenerator::new(1).unwrap();
        assert!(generator.parse("short").is_err());
        assert!(generator.parse("ABCDEFGHIJKLM").is_err());
        assert!(generator.parse("zzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn test_machine_id_range() {
        assert!(SnowflakeIdGenerator::new(1024).is_err());
        assert!(SnowflakeIdGenerator::new(1023).is_ok());
        assert!(SnowflakeIdGenerator::from_hostname().machine_id() <= MAX_MACHINE_ID);
    }

    #[test]
    fn test_concurrent_generation_is_unique() {
        let generator = Arc::new(SnowflakeIdGenerator::new(3).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || (0..2_000).map(|_| generator.next_raw()).collect::<Vec<_>>())
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 16_000);
    }
}
