//! Tagged key/value persistence of schedule state.
//!
//! One entry per line, `<TAG> value`, order-sensitive within a kind block:
//! the kind line first, then kind-specific entries, then the common trailer
//! (`<MINLEARNRATE>` through `<NORMLEARNRATE>`). Save followed by Load must
//! reproduce identical in-memory state, so every field that influences
//! future decisions is written, including NewBob's last accepted criterion
//! when one exists.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::optim::schedule::{
    AdaGrad, Exponential, NewBob, NewBobCriterion, NewBobStatus, Policy, RateList, Schedule,
    ScheduleCommon,
};

pub(crate) fn save(schedule: &Schedule, path: &Path) -> Result<()> {
    let mut out = String::new();
    let mut line = |tag: &str, value: String| {
        // Writing to a String cannot fail.
        let _ = writeln!(out, "<{tag}> {value}");
    };

    line("LRSCHEDULER", schedule.policy.kind_name().to_string());
    match &schedule.policy {
        Policy::AdaGrad(ada) => {
            line("HYPERK", ada.k.to_string());
        }
        Policy::Exponential(exp) => {
            line("BASELR", exp.base_rate.to_string());
            line("BASE", exp.base.to_string());
            line("GAMMA", exp.gamma.to_string());
            line("NSAMPLES", exp.samples.to_string());
        }
        Policy::List(list) => {
            line("NUMRATES", list.rates.len().to_string());
            let rendered: Vec<String> = list.rates.iter().map(|r| r.to_string()).collect();
            line("RATELIST", rendered.join(" "));
        }
        Policy::NewBob(nb) => {
            line("NEWBOBCRT", nb.criterion.tag().to_string());
            line("STATUS", nb.status.tag().to_string());
            line("RAMPSTART", nb.ramp_start.to_string());
            line("STOPDIFF", nb.stop_diff.to_string());
            if let Some(c) = nb.last_criterion {
                line("LASTCRITERION", c.to_string());
            }
        }
    }
    let c = &schedule.common;
    line("MINLEARNRATE", c.floor_rate.to_string());
    line("LEARNRATE", c.rate.to_string());
    line("MINEPOCHNUM", c.min_epoch.to_string());
    line("MAXEPOCHNUM", c.max_epoch.to_string());
    line("EPOCHOFFSET", c.epoch_offset.to_string());
    line("NORMLEARNRATE", if c.normalize { "TRUE" } else { "FALSE" }.to_string());

    fs::write(path, out)?;
    Ok(())
}

pub(crate) fn load(path: &Path) -> Result<Schedule> {
    let text = fs::read_to_string(path)?;
    let mut reader = Reader::new(&text);

    let kind = reader.expect("LRSCHEDULER")?;

    let policy = match kind {
        "ADAGRAD" => Policy::AdaGrad(AdaGrad { k: reader.float("HYPERK")? }),
        "EXPONENTIAL" => Policy::Exponential(Exponential {
            base_rate: reader.float("BASELR")?,
            base: reader.float("BASE")?,
            gamma: reader.float("GAMMA")?,
            samples: reader.integer("NSAMPLES")?,
        }),
        "LIST" => {
            let (count_line, raw_count) = reader.expect_with_line("NUMRATES")?;
            let count: usize = raw_count.parse().map_err(|_| Error::ScheduleFormat {
                line: count_line,
                message: format!("bad integer '{raw_count}' for <NUMRATES>"),
            })?;
            if count == 0 {
                return Err(Error::ScheduleFormat {
                    line: count_line,
                    message: "rate list must hold at least one rate".to_string(),
                });
            }
            let (line_no, raw) = reader.expect_with_line("RATELIST")?;
            let rates: Vec<f32> = raw
                .split_whitespace()
                .map(|v| {
                    v.parse().map_err(|_| Error::ScheduleFormat {
                        line: line_no,
                        message: format!("bad rate value '{v}'"),
                    })
                })
                .collect::<Result<_>>()?;
            if rates.len() != count {
                return Err(Error::ScheduleFormat {
                    line: line_no,
                    message: format!("expected {count} rates, found {}", rates.len()),
                });
            }
            Policy::List(RateList { rates })
        }
        "NEWBOB" => {
            let (crt_line, crt) = reader.expect_with_line("NEWBOBCRT")?;
            let criterion = NewBobCriterion::from_tag(crt).ok_or_else(|| Error::ScheduleFormat {
                line: crt_line,
                message: format!("unknown criterion '{crt}'"),
            })?;
            let (status_line, status_tag) = reader.expect_with_line("STATUS")?;
            let status = NewBobStatus::from_tag(status_tag).ok_or_else(|| Error::ScheduleFormat {
                line: status_line,
                message: format!("unknown status '{status_tag}'"),
            })?;
            let ramp_start = reader.float("RAMPSTART")?;
            let stop_diff = reader.float("STOPDIFF")?;
            let last_criterion = if reader.peek_tag() == Some("LASTCRITERION") {
                Some(reader.float("LASTCRITERION")?)
            } else {
                None
            };
            Policy::NewBob(NewBob { criterion, status, ramp_start, stop_diff, last_criterion })
        }
        other => return Err(Error::UnknownScheduler(other.to_string())),
    };

    let common = ScheduleCommon {
        floor_rate: reader.float("MINLEARNRATE")?,
        rate: reader.float("LEARNRATE")?,
        min_epoch: reader.integer("MINEPOCHNUM")? as usize,
        max_epoch: reader.integer("MAXEPOCHNUM")? as usize,
        epoch_offset: reader.integer("EPOCHOFFSET")? as usize,
        normalize: reader.boolean("NORMLEARNRATE")?,
    };

    Ok(Schedule { common, policy })
}

/// Line-oriented reader over `<TAG> value` entries.
struct Reader<'a> {
    entries: Vec<(usize, &'a str, &'a str)>,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(text: &'a str) -> Self {
        let entries = text
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, l)| {
                let trimmed = l.trim();
                match trimmed.split_once(' ') {
                    Some((tag, rest)) => (i + 1, tag, rest.trim()),
                    None => (i + 1, trimmed, ""),
                }
            })
            .collect();
        Self { entries, pos: 0 }
    }

    fn peek_tag(&self) -> Option<&'a str> {
        self.entries.get(self.pos).map(|&(_, tag, _)| tag.trim_start_matches('<').trim_end_matches('>'))
    }

    fn expect_with_line(&mut self, tag: &str) -> Result<(usize, &'a str)> {
        let Some(&(line, found, value)) = self.entries.get(self.pos) else {
            return Err(Error::ScheduleFormat {
                line: self.entries.last().map_or(0, |&(l, _, _)| l),
                message: format!("missing <{tag}> entry"),
            });
        };
        let name = found.trim_start_matches('<').trim_end_matches('>');
        if name != tag {
            return Err(Error::ScheduleFormat {
                line,
                message: format!("expected <{tag}>, found {found}"),
            });
        }
        self.pos += 1;
        Ok((line, value))
    }

    fn expect(&mut self, tag: &str) -> Result<&'a str> {
        self.expect_with_line(tag).map(|(_, v)| v)
    }

    fn float(&mut self, tag: &str) -> Result<f32> {
        let (line, value) = self.expect_with_line(tag)?;
        value.parse().map_err(|_| Error::ScheduleFormat {
            line,
            message: format!("bad float '{value}' for <{tag}>"),
        })
    }

    fn integer(&mut self, tag: &str) -> Result<u64> {
        let (line, value) = self.expect_with_line(tag)?;
        value.parse().map_err(|_| Error::ScheduleFormat {
            line,
            message: format!("bad integer '{value}' for <{tag}>"),
        })
    }

    fn boolean(&mut self, tag: &str) -> Result<bool> {
        let (line, value) = self.expect_with_line(tag)?;
        match value {
            "TRUE" => Ok(true),
            "FALSE" => Ok(false),
            _ => Err(Error::ScheduleFormat {
                line,
                message: format!("expected TRUE or FALSE for <{tag}>, found '{value}'"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn round_trip(schedule: &Schedule) -> Schedule {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("schedule.txt");
        schedule.save(&path).expect("save schedule");
        Schedule::load(&path).expect("load schedule")
    }

    #[test]
    fn test_round_trip_adagrad() {
        let s = Schedule::adagrad(0.05, 2.5)
            .with_epoch_bounds(2, 30)
            .with_floor_rate(1e-6)
            .with_normalization(true);
        assert_eq!(round_trip(&s), s);
    }

    #[test]
    fn test_round_trip_exponential_mid_run() {
        let mut s = Schedule::exponential(0.1, 10.0, 1000.0).with_epoch_bounds(0, 20);
        // Advance past a few updates so the sample index is non-trivial.
        s.rate_for_update(640);
        assert_eq!(round_trip(&s), s);
    }

    #[test]
    fn test_round_trip_list() {
        let s = Schedule::rate_list(vec![0.5, 0.25, 0.125]).with_epoch_offset(4);
        assert_eq!(round_trip(&s), s);
    }

    #[test]
    fn test_round_trip_newbob_with_baseline() {
        let mut s = Schedule::newbob(0.8, NewBobCriterion::MapAcc, 0.004, 0.002)
            .with_epoch_bounds(1, 40)
            .with_floor_rate(1e-5);
        s.end_epoch(0, 0.517);
        s.end_epoch(1, 0.5172); // halves and starts ramping
        assert_eq!(round_trip(&s), s);
    }

    #[test]
    fn test_saved_file_uses_tagged_lines() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("schedule.txt");
        let s = Schedule::newbob(0.5, NewBobCriterion::Acc, 0.004, 0.002);
        s.save(&path).expect("save schedule");

        let text = std::fs::read_to_string(&path).expect("read back");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "<LRSCHEDULER> NEWBOB");
        assert_eq!(lines[1], "<NEWBOBCRT> ACC");
        assert_eq!(lines[2], "<STATUS> INITIAL");
        assert!(lines.iter().any(|l| l.starts_with("<NORMLEARNRATE> ")));
    }

    #[test]
    fn test_unknown_scheduler_kind_rejected() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("schedule.txt");
        std::fs::write(&path, "<LRSCHEDULER> COSINE\n").expect("write file");
        match Schedule::load(&path) {
            Err(Error::UnknownScheduler(kind)) => assert_eq!(kind, "COSINE"),
            other => panic!("expected UnknownScheduler, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_order_entries_rejected() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("schedule.txt");
        // LEARNRATE before MINLEARNRATE violates the trailer order.
        std::fs::write(
            &path,
            "<LRSCHEDULER> ADAGRAD\n<HYPERK> 1\n<LEARNRATE> 0.1\n<MINLEARNRATE> 0\n",
        )
        .expect("write file");
        match Schedule::load(&path) {
            Err(Error::ScheduleFormat { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected ScheduleFormat error, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_length_rate_list_rejected() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("schedule.txt");
        std::fs::write(
            &path,
            "<LRSCHEDULER> LIST\n<NUMRATES> 0\n<RATELIST> \n<MINLEARNRATE> 0\n",
        )
        .expect("write file");
        match Schedule::load(&path) {
            Err(Error::ScheduleFormat { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("at least one rate"));
            }
            other => panic!("expected ScheduleFormat error, got {other:?}"),
        }
    }

    #[test]
    fn test_loaded_schedule_honours_global_epoch_bound() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("schedule.txt");
        // 2 epochs already finished, hard maximum of 3.
        let s = Schedule::adagrad(0.1, 1.0).with_epoch_bounds(0, 3).with_epoch_offset(2);
        s.save(&path).expect("save schedule");

        let mut resumed = Schedule::load(&path).expect("load schedule");
        assert!(
            !resumed.end_epoch(0, 0.5).continue_training,
            "resumed run must stop at the same global epoch as the uninterrupted one"
        );
    }

    #[test]
    fn test_loaded_rate_list_continues_where_it_left_off() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("schedule.txt");
        let s = Schedule::rate_list(vec![0.4, 0.2, 0.1]).with_epoch_offset(1);
        s.save(&path).expect("save schedule");

        let mut resumed = Schedule::load(&path).expect("load schedule");
        resumed.begin_epoch(0);
        assert_eq!(resumed.current_rate(), 0.2, "first resumed epoch takes the second rate");
    }

    #[test]
    fn test_bad_float_reports_line() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("schedule.txt");
        std::fs::write(&path, "<LRSCHEDULER> ADAGRAD\n<HYPERK> abc\n").expect("write file");
        match Schedule::load(&path) {
            Err(Error::ScheduleFormat { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("abc"));
            }
            other => panic!("expected ScheduleFormat error, got {other:?}"),
        }
    }
}
