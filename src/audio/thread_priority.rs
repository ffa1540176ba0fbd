// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Default priority for the audio callback thread when WAVESYNTH_THREAD_PRIORITY is unset.
const DEFAULT_CALLBACK_THREAD_PRIORITY: u8 = 70;

const THREAD_PRIORITY_VAR: &str = "WAVESYNTH_THREAD_PRIORITY";
const DISABLE_RT_AUDIO_VAR: &str = "WAVESYNTH_DISABLE_RT_AUDIO";

/// Audio callback scheduling, read from the environment once before the stream starts.
#[derive(Debug, Clone, Copy)]
pub struct CallbackPriority {
    priority: Option<ThreadPriorityValue>,
    rt_audio: bool,
    applied: bool,
}

impl CallbackPriority {
    /// Reads WAVESYNTH_THREAD_PRIORITY (0-99) and WAVESYNTH_DISABLE_RT_AUDIO.
    pub fn from_env() -> CallbackPriority {
        CallbackPriority {
            priority: ThreadPriorityValue::try_from(parse_priority(
                std::env::var(THREAD_PRIORITY_VAR).ok().as_deref(),
            ))
            .ok(),
            rt_audio: !env_flag(DISABLE_RT_AUDIO_VAR),
            applied: false,
        }
    }

    /// Raises the priority of the calling thread. Only the first call does anything,
    /// so this can sit at the top of every callback.
    #[inline]
    pub fn apply(&mut self) {
        if self.applied {
            return;
        }
        self.applied = true;

        let Some(priority) = self.priority else {
            return;
        };
        let tp = ThreadPriority::Crossplatform(priority);
        if let Err(e) = set_current_thread_priority(tp) {
            warn!(error = ?e, "Failed to raise audio callback thread priority");
        }

        #[cfg(unix)]
        if self.rt_audio {
            use thread_priority::unix::{
                set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
                ThreadSchedulePolicy,
            };
            match set_thread_priority_and_policy(
                thread_native_id(),
                tp,
                ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
            ) {
                Ok(()) => info!("Enabled RT SCHED_FIFO for audio callback thread"),
                Err(e) => warn!(
                    error = %e,
                    "Failed to set RT SCHED_FIFO for audio callback thread"
                ),
            }
        }
    }
}

fn parse_priority(value: Option<&str>) -> u8 {
    value
        .and_then(|v| v.trim().parse::<u8>().ok())
        .filter(|n| *n < 100)
        .unwrap_or(DEFAULT_CALLBACK_THREAD_PRIORITY)
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    value == "1"
        || value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("yes")
        || value.eq_ignore_ascii_case("on")
}
