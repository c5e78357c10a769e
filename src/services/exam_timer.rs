//! 计时与阶段状态机 - 业务能力层
//!
//! 两个独立的时钟，都以"每秒一次 tick"驱动，本身不持有定时器：
//! - `ExamClock`：整场考试倒计时，归零时只报告一次 `Expired`
//! - `ListeningPhaseMachine`：听力 Audio → Review → Ended
//!
//! 定时器由编排层持有，模块结束即销毁。

use serde::Serialize;

/// 整场倒计时单次 tick 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockTick {
    /// 仍在计时，附剩余秒数
    Running(u32),
    /// 已暂停，本次不计
    Paused,
    /// 本次 tick 归零（只出现一次）
    Expired,
    /// 已归零或已停止，之后的 tick 全部忽略
    Stopped,
}

/// 整场考试倒计时
#[derive(Debug, Clone)]
pub struct ExamClock {
    time_left: u32,
    running: bool,
    stopped: bool,
}

impl ExamClock {
    pub fn new(duration_secs: u32) -> Self {
        Self {
            time_left: duration_secs,
            running: true,
            stopped: false,
        }
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn is_running(&self) -> bool {
        self.running && !self.stopped
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// 暂停 / 继续；停止后无效，返回切换后的运行状态
    pub fn toggle(&mut self) -> bool {
        if !self.stopped {
            self.running = !self.running;
        }
        self.is_running()
    }

    /// 永久停止
    pub fn stop(&mut self) {
        self.stopped = true;
        self.running = false;
    }

    /// 推进一秒
    pub fn tick(&mut self) -> ClockTick {
        if self.stopped {
            return ClockTick::Stopped;
        }
        if !self.running {
            return ClockTick::Paused;
        }
        self.time_left = self.time_left.saturating_sub(1);
        if self.time_left == 0 {
            self.stop();
            ClockTick::Expired
        } else {
            ClockTick::Running(self.time_left)
        }
    }
}

/// 听力阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListeningPhase {
    /// 音频播放中
    Audio,
    /// 音频结束后的检查时间
    Review,
    /// 终态
    Ended,
}

/// 听力阶段状态机
///
/// - Audio → Review：只由外部"音频播放结束"信号触发
/// - Review → Ended：检查倒计时归零时触发
#[derive(Debug, Clone)]
pub struct ListeningPhaseMachine {
    phase: ListeningPhase,
    review_time_left: u32,
    review_duration: u32,
}

impl ListeningPhaseMachine {
    pub fn new(review_duration_secs: u32) -> Self {
        Self {
            phase: ListeningPhase::Audio,
            review_time_left: 0,
            review_duration: review_duration_secs,
        }
    }

    pub fn phase(&self) -> ListeningPhase {
        self.phase
    }

    pub fn review_time_left(&self) -> u32 {
        self.review_time_left
    }

    /// 进入检查阶段；只在 Audio 阶段有效
    pub fn start_review_phase(&mut self) -> bool {
        if self.phase != ListeningPhase::Audio {
            return false;
        }
        self.phase = ListeningPhase::Review;
        self.review_time_left = self.review_duration;
        true
    }

    /// 推进一秒；本次 tick 进入 Ended 时返回 true（只会发生一次）
    pub fn tick(&mut self) -> bool {
        if self.phase != ListeningPhase::Review {
            return false;
        }
        self.review_time_left = self.review_time_left.saturating_sub(1);
        if self.review_time_left == 0 {
            self.phase = ListeningPhase::Ended;
            true
        } else {
            false
        }
    }

    /// 强制结束（整场时间耗尽或模块被提前结束）
    pub fn end(&mut self) {
        self.phase = ListeningPhase::Ended;
        self.review_time_left = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_expires_exactly_once() {
        let mut clock = ExamClock::new(3);
        assert_eq!(clock.tick(), ClockTick::Running(2));
        assert_eq!(clock.tick(), ClockTick::Running(1));
        assert_eq!(clock.tick(), ClockTick::Expired);
        assert_eq!(clock.tick(), ClockTick::Stopped);
        assert_eq!(clock.tick(), ClockTick::Stopped);
        assert_eq!(clock.time_left(), 0);
    }

    #[test]
    fn test_clock_never_increases() {
        let mut clock = ExamClock::new(50);
        let mut last = clock.time_left();
        for _ in 0..60 {
            clock.tick();
            assert!(clock.time_left() <= last);
            last = clock.time_left();
        }
        assert_eq!(last, 0);
    }

    #[test]
    fn test_clock_pause() {
        let mut clock = ExamClock::new(10);
        assert!(!clock.toggle());
        assert_eq!(clock.tick(), ClockTick::Paused);
        assert_eq!(clock.time_left(), 10);
        assert!(clock.toggle());
        assert_eq!(clock.tick(), ClockTick::Running(9));
    }

    #[test]
    fn test_stopped_clock_ignores_toggle() {
        let mut clock = ExamClock::new(10);
        clock.stop();
        assert!(!clock.toggle());
        assert_eq!(clock.tick(), ClockTick::Stopped);
    }

    #[test]
    fn test_zero_duration_expires_on_first_tick() {
        let mut clock = ExamClock::new(0);
        assert_eq!(clock.tick(), ClockTick::Expired);
    }

    #[test]
    fn test_review_only_after_audio_signal() {
        let mut phase = ListeningPhaseMachine::new(120);
        for _ in 0..500 {
            assert!(!phase.tick());
        }
        assert_eq!(phase.phase(), ListeningPhase::Audio);

        assert!(phase.start_review_phase());
        assert!(!phase.start_review_phase());
        assert_eq!(phase.review_time_left(), 120);
    }

    #[test]
    fn test_review_counts_down_to_ended() {
        let mut phase = ListeningPhaseMachine::new(120);
        phase.start_review_phase();
        let mut ended = 0;
        for _ in 0..119 {
            if phase.tick() {
                ended += 1;
            }
        }
        assert_eq!(phase.phase(), ListeningPhase::Review);
        assert_eq!(phase.review_time_left(), 1);
        for _ in 0..10 {
            if phase.tick() {
                ended += 1;
            }
        }
        assert_eq!(ended, 1);
        assert_eq!(phase.phase(), ListeningPhase::Ended);
        assert_eq!(phase.review_time_left(), 0);
        assert!(!phase.start_review_phase());
    }
}
