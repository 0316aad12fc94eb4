//! 시계 포트.
//!
//! 메트릭 시점은 모두 단조 시계(밀리초) 기준이다. 벽시계가 점프해도
//! 소비 시간이 음수가 되지 않으며, 큰 값으로 점프하면 입찰은 만료로 판정된다.

use std::time::Instant;

/// 밀리초 단위 시계
pub trait Clock: Send + Sync {
    /// 시계 원점부터 경과한 밀리초
    fn current_time_millis(&self) -> u64;
}

/// `Instant` 기반 단조 시계. 원점은 생성 시점
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn current_time_millis(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
