//! Test execution state machine
//!
//! Walks the command span of one test in file order, issuing transport
//! operations and comparing responses against expectations. Per-command
//! failures set the error flag and produce a red log line; they never
//! propagate as errors, so a failing test still runs to completion
//! unless terminate-on-error, `end_on_error`, or an abort stops it.

use std::time::Duration;

use tokio::time::Instant;

use crate::script::{ChannelId, Command, CommandKind, Script};
use crate::transport::LineTransport;

use super::{AbortSignal, LogSink, Operator};

/// Cap on a single waitfor read attempt, so the abort signal and the
/// overall deadline are re-checked at a reasonable cadence
const WAITFOR_POLL: Duration = Duration::from_millis(50);

/// How a test run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The test ran to its end (it may still have failed; see `saw_error`)
    Completed,
    /// An abort request was observed and the test stopped where it was
    Aborted,
}

/// What the dispatch loop should do after a command
enum Step {
    Continue,
    /// `end_on_error` fired: skip the rest of the test's span
    StopTest,
    /// Abort observed inside a poll loop
    Abort,
}

/// Interprets the commands belonging to one test
pub struct Engine {
    channels: [LineTransport; 2],
    sink: Box<dyn LogSink>,
    operator: Box<dyn Operator>,
    abort: AbortSignal,
    terminate_on_error: bool,
    error_encountered: bool,
    terminated_early: bool,
    /// Most recent response line, shared by consecutive reads and expects
    response: String,
    current_test: String,
    current_desc: String,
    current_units: String,
}

impl Engine {
    pub fn new(
        channel_a: LineTransport,
        channel_b: LineTransport,
        sink: Box<dyn LogSink>,
        operator: Box<dyn Operator>,
        abort: AbortSignal,
    ) -> Self {
        Self {
            channels: [channel_a, channel_b],
            sink,
            operator,
            abort,
            terminate_on_error: false,
            error_encountered: false,
            terminated_early: false,
            response: String::new(),
            current_test: String::new(),
            current_desc: String::new(),
            current_units: String::new(),
        }
    }

    /// Stop the current test after the first failing command
    pub fn set_terminate_on_error(&mut self, terminate: bool) {
        self.terminate_on_error = terminate;
    }

    /// Set the read timeouts for channels A and B
    pub fn set_channel_timeouts(&mut self, a: Duration, b: Duration) {
        self.channels[0].set_timeout(a);
        self.channels[1].set_timeout(b);
    }

    /// Whether the just-completed run recorded any failure
    pub fn saw_error(&self) -> bool {
        self.error_encountered
    }

    /// Whether the just-completed run stopped at an `end_on_error`
    pub fn terminated_early(&self) -> bool {
        self.terminated_early
    }

    /// Name of the test currently (or last) executed
    pub fn current_test(&self) -> &str {
        &self.current_test
    }

    /// Description recorded by the current test's `desc` command
    pub fn current_desc(&self) -> &str {
        &self.current_desc
    }

    /// Units recorded by the current test's `units` command
    pub fn current_units(&self) -> &str {
        &self.current_units
    }

    /// Run test `n` of the script
    ///
    /// An out-of-range index is a vacuous pass, never an error. The abort
    /// signal is sampled before every command; once observed the engine
    /// stops immediately and reports [`RunOutcome::Aborted`].
    #[tracing::instrument(skip(self, script), fields(test = n))]
    pub async fn run_test(&mut self, script: &Script, n: usize) -> RunOutcome {
        self.error_encountered = false;
        self.terminated_early = false;

        for index in script.test_span(n) {
            if self.abort.is_requested() {
                tracing::info!("abort requested, stopping test");
                self.error_encountered = true;
                return RunOutcome::Aborted;
            }

            let command = &script.commands()[index];
            match self.dispatch(command).await {
                Step::Continue => {}
                Step::StopTest => return RunOutcome::Completed,
                Step::Abort => return RunOutcome::Aborted,
            }

            if self.terminate_on_error && self.error_encountered {
                tracing::debug!(line = command.line_number, "terminate-on-error, stopping test");
                break;
            }
        }

        RunOutcome::Completed
    }

    async fn dispatch(&mut self, command: &Command) -> Step {
        match &command.kind {
            CommandKind::Test(name) => {
                self.current_test = name.clone();
                self.current_desc.clear();
                self.current_units.clear();
                self.sink.black(&format!("Test: {name}"));
            }
            CommandKind::ScriptVersion(_) => self.sink.gray(&command.line),
            CommandKind::Desc(text) => {
                self.current_desc = text.clone();
                self.sink.black(&format!("TestDesc: {text}"));
            }
            CommandKind::Units(text) => {
                self.current_units = text.clone();
                self.sink.black(&format!("TestUnits: {text}"));
            }
            CommandKind::Comment => {
                if !command.line.is_empty() {
                    self.sink.gray(&command.line);
                }
            }
            CommandKind::Sleep(ms) => {
                self.sink.gray(&command.line);
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            CommandKind::Prompt(text) => self.exec_prompt(text).await,
            CommandKind::Pause(text) => self.exec_pause(text).await,
            CommandKind::SendLine(channel, text) => self.exec_sendline(*channel, text).await,
            CommandKind::ReadLine(channel) => self.exec_readline(*channel).await,
            CommandKind::Flush(channel) => {
                if let Err(e) = self.channels[channel.index()].flush() {
                    tracing::warn!(channel = %channel, error = %e, "flush failed");
                }
            }
            CommandKind::ExpectRange { field, min, max } => {
                self.exec_expect_range(&command.line, *field, *min, *max);
            }
            CommandKind::ExpectChar {
                field,
                pos,
                expected,
            } => {
                self.exec_expect_char(&command.line, *field, *pos, *expected);
            }
            CommandKind::ExpectString { field, expected } => {
                self.exec_expect_str(&command.line, *field, expected);
            }
            CommandKind::WaitFor {
                channel,
                timeout_ms,
                needle,
            } => {
                return self
                    .exec_waitfor(&command.line, *channel, *timeout_ms, needle)
                    .await;
            }
            CommandKind::EndOnError => {
                if self.error_encountered {
                    self.terminated_early = true;
                    return Step::StopTest;
                }
            }
            CommandKind::Unknown => {
                self.sink.red(&format!("Unknown directive: {}", command.line));
                self.error_encountered = true;
            }
        }
        Step::Continue
    }

    async fn exec_prompt(&mut self, text: &str) {
        match self.operator.ask_yes_no(text).await {
            Ok(true) => self.sink.black("Operator response: POSITIVE"),
            Ok(false) => {
                self.sink.red("Operator response: NEGATIVE");
                self.error_encountered = true;
            }
            Err(e) => {
                self.sink.red(&format!("Operator interaction failed: {e}"));
                self.error_encountered = true;
            }
        }
    }

    async fn exec_pause(&mut self, text: &str) {
        if let Err(e) = self.operator.notify(text).await {
            self.sink.red(&format!("Operator interaction failed: {e}"));
            self.error_encountered = true;
        }
    }

    /// Flush, send the line, then capture one response line
    ///
    /// Only a short write is a failure here; a silent instrument just
    /// leaves the response buffer empty.
    async fn exec_sendline(&mut self, channel: ChannelId, text: &str) {
        let transport = &mut self.channels[channel.index()];
        if let Err(e) = transport.flush() {
            tracing::warn!(channel = %channel, error = %e, "flush before send failed");
        }
        if let Err(e) = transport.write_line(text).await {
            self.sink
                .red(&format!("FAILED to send command on channel {channel}: {e}"));
            self.error_encountered = true;
        }
        self.sink.black(&format!(">> {text}"));

        let timeout = self.channels[channel.index()].timeout();
        match self.channels[channel.index()].read_line(timeout).await {
            Ok(line) => {
                self.sink.black(&format!("<< {line}"));
                self.response = line;
            }
            Err(_) => self.response.clear(),
        }
    }

    async fn exec_readline(&mut self, channel: ChannelId) {
        self.response.clear();
        let timeout = self.channels[channel.index()].timeout();
        match self.channels[channel.index()].read_line(timeout).await {
            Ok(line) => {
                self.sink.black(&format!("<< {line}"));
                self.response = line;
            }
            Err(e) => {
                tracing::debug!(channel = %channel, error = %e, "readline failed");
                self.sink
                    .red(&format!("FAILED to read from channel {channel}"));
                self.error_encountered = true;
            }
        }
    }

    /// Numeric field of the stored response must lie in `[min, max]`,
    /// inclusive on both ends
    fn exec_expect_range(&mut self, line: &str, field: usize, min: f64, max: f64) {
        self.sink.black(line);
        let Some(token) = self.response_field(field) else {
            self.sink.red("Test FAILED - expected field not found");
            self.error_encountered = true;
            return;
        };
        let Ok(value) = token.parse::<f64>() else {
            self.sink
                .red("Test FAILED - unexpected data returned from instrument");
            self.error_encountered = true;
            return;
        };
        if value < min || value > max {
            self.sink.red(&format!(
                "Test FAILED: {value:.3} not in expected range [{min:.3}, {max:.3}]"
            ));
            self.error_encountered = true;
        } else {
            self.sink.black(&format!(
                "Test PASSED: {value:.3} in expected range [{min:.3}, {max:.3}]"
            ));
        }
    }

    fn exec_expect_char(&mut self, line: &str, field: usize, pos: usize, expected: char) {
        self.sink.black(line);
        let Some(token) = self.response_field(field) else {
            self.sink.red("Test FAILED - expected field not found");
            self.error_encountered = true;
            return;
        };
        match token.chars().nth(pos - 1) {
            None => {
                self.sink.red("Test FAILED - field shorter than expected");
                self.error_encountered = true;
            }
            Some(actual) if actual != expected => {
                self.sink.red(&format!(
                    "Test FAILED - character mismatch - expected '{expected}', saw '{actual}'"
                ));
                self.error_encountered = true;
            }
            Some(_) => self.sink.black("Test PASSED"),
        }
    }

    fn exec_expect_str(&mut self, line: &str, field: usize, expected: &str) {
        self.sink.black(line);
        let Some(token) = self.response_field(field) else {
            self.sink.red("Test FAILED - expected field not found");
            self.error_encountered = true;
            return;
        };
        if token == expected {
            self.sink.black("Test PASSED");
        } else {
            self.sink.red("Test FAILED - expected string not found");
            self.error_encountered = true;
        }
    }

    /// Poll the channel until a received line contains `needle` or the
    /// deadline passes
    ///
    /// Each read attempt uses a short timeout so the overall deadline and
    /// the abort signal are observed promptly. Succeeds the instant a
    /// response matches; no further reads are attempted.
    async fn exec_waitfor(
        &mut self,
        line: &str,
        channel: ChannelId,
        timeout_ms: u64,
        needle: &str,
    ) -> Step {
        self.sink.black(line);
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            if self.abort.is_requested() {
                tracing::info!("abort requested, stopping waitfor");
                self.error_encountered = true;
                return Step::Abort;
            }

            let now = Instant::now();
            if now >= deadline {
                self.sink.red("Test FAILED (waitfor) - timeout");
                self.error_encountered = true;
                return Step::Continue;
            }

            let attempt = (deadline - now).min(WAITFOR_POLL);
            if let Ok(response) = self.channels[channel.index()].read_line(attempt).await {
                self.sink.black(&format!("<< {response}"));
                let matched = response.contains(needle);
                self.response = response;
                if matched {
                    self.sink.black(&format!("found string: {needle}"));
                    return Step::Continue;
                }
            }
        }
    }

    /// 1-based whitespace-separated field of the stored response buffer
    fn response_field(&self, field: usize) -> Option<String> {
        self.response
            .split_whitespace()
            .nth(field - 1)
            .map(|s| s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Script;
    use crate::testing::{CollectingSink, ScriptedOperator, SimChannel};
    use std::io::Cursor;

    struct Harness {
        engine: Engine,
        channel_a: SimChannel,
        channel_b: SimChannel,
        sink: CollectingSink,
        abort: AbortSignal,
    }

    fn harness() -> Harness {
        harness_with_operator(ScriptedOperator::new(&[]))
    }

    fn harness_with_operator(operator: ScriptedOperator) -> Harness {
        let channel_a = SimChannel::new();
        let channel_b = SimChannel::new();
        let sink = CollectingSink::new();
        let abort = AbortSignal::new();
        let mut engine = Engine::new(
            LineTransport::new('A', Box::new(channel_a.clone()), Duration::ZERO),
            LineTransport::new('B', Box::new(channel_b.clone()), Duration::ZERO),
            Box::new(sink.clone()),
            Box::new(operator),
            abort.clone(),
        );
        engine.set_channel_timeouts(Duration::from_millis(50), Duration::from_millis(50));
        Harness {
            engine,
            channel_a,
            channel_b,
            sink,
            abort,
        }
    }

    fn script(text: &str) -> Script {
        Script::from_reader(Cursor::new(text.to_string())).unwrap()
    }

    #[tokio::test]
    async fn out_of_range_test_is_a_vacuous_pass() {
        let mut h = harness();
        let s = script("test Only\nsleep 1\n");

        let outcome = h.engine.run_test(&s, 5).await;
        assert_eq!(outcome, RunOutcome::Completed);
        assert!(!h.engine.saw_error());
        assert!(!h.engine.terminated_early());
    }

    #[tokio::test]
    async fn expect_range_bounds_are_inclusive() {
        for (reply, should_pass) in [("10.0", true), ("20.0", true), ("9.999", false), ("20.001", false)]
        {
            let mut h = harness();
            h.channel_a.enqueue(&format!("{reply}\n"));
            let s = script("test Range\nreadline_a\nexpect 1 10 20\n");

            h.engine.run_test(&s, 0).await;
            assert_eq!(
                !h.engine.saw_error(),
                should_pass,
                "reply {reply} expected pass={should_pass}"
            );
        }
    }

    #[tokio::test]
    async fn expect_range_reports_missing_field() {
        let mut h = harness();
        h.channel_a.enqueue("just_one\n");
        let s = script("test T\nreadline_a\nexpect 2 0 1\n");

        h.engine.run_test(&s, 0).await;
        assert!(h.engine.saw_error());
        assert!(h.sink.contains("expected field not found"));
    }

    #[tokio::test]
    async fn expect_range_reports_non_numeric_field() {
        let mut h = harness();
        h.channel_a.enqueue("abc\n");
        let s = script("test T\nreadline_a\nexpect 1 0 1\n");

        h.engine.run_test(&s, 0).await;
        assert!(h.engine.saw_error());
        assert!(h.sink.contains("unexpected data"));
    }

    #[tokio::test]
    async fn expect_char_checks_position() {
        let mut h = harness();
        h.channel_a.enqueue("V2.1 DONE\n");
        let s = script("test T\nreadline_a\nexpect_char 1 1 V\nexpect_char 2 1 X\n");

        h.engine.run_test(&s, 0).await;
        assert!(h.engine.saw_error());
        assert!(h.sink.contains("expected 'X', saw 'D'"));
    }

    #[tokio::test]
    async fn expect_char_rejects_short_token() {
        let mut h = harness();
        h.channel_a.enqueue("ab\n");
        let s = script("test T\nreadline_a\nexpect_char 1 5 z\n");

        h.engine.run_test(&s, 0).await;
        assert!(h.engine.saw_error());
        assert!(h.sink.contains("shorter than expected"));
    }

    #[tokio::test]
    async fn expect_str_is_exact() {
        let mut h = harness();
        h.channel_a.enqueue("STATUS ok\n");
        let s = script("test T\nreadline_a\nexpect_str 2 ok\nexpect_str 2 OK\n");

        h.engine.run_test(&s, 0).await;
        // case differs: second check must fail, first must pass
        assert!(h.engine.saw_error());
        assert!(h.sink.contains("Test PASSED"));
        assert!(h.sink.contains("expected string not found"));
    }

    #[tokio::test]
    async fn sendline_round_trip_passes() {
        let mut h = harness();
        h.channel_a.reply_with("15 ok");
        let s = script("test T1\nsendline_a PING\nexpect 1 10 20\n");

        let outcome = h.engine.run_test(&s, 0).await;
        assert_eq!(outcome, RunOutcome::Completed);
        assert!(!h.engine.saw_error());
        assert_eq!(h.channel_a.written_text(), "PING\r\n");
    }

    #[tokio::test]
    async fn readline_timeout_is_a_failure() {
        let mut h = harness();
        let s = script("test T\nreadline_b\n");

        h.engine.run_test(&s, 0).await;
        assert!(h.engine.saw_error());
        assert!(h.sink.contains("FAILED to read from channel B"));
    }

    #[tokio::test]
    async fn short_write_is_a_failure() {
        let mut h = harness();
        h.channel_a.drop_writes();
        let s = script("test T\nsendline_a PING\n");

        h.engine.run_test(&s, 0).await;
        assert!(h.engine.saw_error());
        assert!(h.sink.contains("FAILED to send command on channel A"));
    }

    #[tokio::test]
    async fn end_on_error_stops_the_test_early() {
        let mut h = harness();
        h.channel_a.enqueue("5\n");
        let s = script("test T\nreadline_a\nexpect 1 10 20\nend_on_error\nsendline_a NEVER\n");

        let outcome = h.engine.run_test(&s, 0).await;
        assert_eq!(outcome, RunOutcome::Completed);
        assert!(h.engine.saw_error());
        assert!(h.engine.terminated_early());
        // the command after end_on_error never ran
        assert_eq!(h.channel_a.written_text(), "");
    }

    #[tokio::test]
    async fn end_on_error_is_a_no_op_without_a_failure() {
        let mut h = harness();
        h.channel_a.enqueue("15\n");
        let s = script("test T\nreadline_a\nexpect 1 10 20\nend_on_error\nsleep 1\n");

        h.engine.run_test(&s, 0).await;
        assert!(!h.engine.saw_error());
        assert!(!h.engine.terminated_early());
    }

    #[tokio::test]
    async fn abort_stops_the_run_immediately() {
        let mut h = harness();
        h.abort.request();
        let s = script("test T\nsendline_a PING\n");

        let outcome = h.engine.run_test(&s, 0).await;
        assert_eq!(outcome, RunOutcome::Aborted);
        assert!(h.engine.saw_error());
        // nothing was sent: the abort was observed before the command
        assert_eq!(h.channel_a.written_text(), "");
    }

    #[tokio::test]
    async fn terminate_on_error_stops_after_failing_command() {
        let mut h = harness();
        h.engine.set_terminate_on_error(true);
        h.channel_a.enqueue("5\n");
        let s = script("test T\nreadline_a\nexpect 1 10 20\nsendline_a NEVER\n");

        h.engine.run_test(&s, 0).await;
        assert!(h.engine.saw_error());
        assert_eq!(h.channel_a.written_text(), "");
    }

    #[tokio::test]
    async fn waitfor_times_out_after_its_budget() {
        let mut h = harness();
        let s = script("test T\nwaitfor a 200 READY\n");

        let start = std::time::Instant::now();
        h.engine.run_test(&s, 0).await;
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(h.engine.saw_error());
        assert!(h.sink.contains("(waitfor) - timeout"));
    }

    #[tokio::test]
    async fn waitfor_succeeds_on_matching_line() {
        let mut h = harness();
        h.channel_b.enqueue("one\ntwo\nREADY now\nlater\n");
        let s = script("test T\nwaitfor b 500 READY\n");

        let start = std::time::Instant::now();
        h.engine.run_test(&s, 0).await;
        assert!(!h.engine.saw_error());
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(h.sink.contains("found string: READY"));
        // no reads past the match
        assert!(!h.sink.contains("<< later"));
    }

    #[tokio::test]
    async fn waitfor_observes_abort_inside_the_poll_loop() {
        let mut h = harness();
        let abort = h.abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            abort.request();
        });
        let s = script("test T\nwaitfor a 5000 NEVER\n");

        let start = std::time::Instant::now();
        let outcome = h.engine.run_test(&s, 0).await;
        assert_eq!(outcome, RunOutcome::Aborted);
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn prompt_negative_fails_the_test() {
        let mut h = harness_with_operator(ScriptedOperator::new(&[false]));
        let s = script("test T\nprompt Is the LED lit?\n");

        h.engine.run_test(&s, 0).await;
        assert!(h.engine.saw_error());
        assert!(h.sink.contains("Operator response: NEGATIVE"));
    }

    #[tokio::test]
    async fn prompt_positive_and_pause_never_fail() {
        let operator = ScriptedOperator::new(&[true]);
        let seen = operator.seen();
        let mut h = harness_with_operator(operator);
        let s = script("test T\nprompt Ready?\npause Connect the fixture\n");

        h.engine.run_test(&s, 0).await;
        assert!(!h.engine.saw_error());
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["Ready?", "Connect the fixture"]
        );
    }

    #[tokio::test]
    async fn log_lines_carry_their_severity() {
        let mut h = harness();
        h.channel_a.enqueue("5\n");
        let s = script("test T\n# setup note\nreadline_a\nexpect 1 10 20\n");

        h.engine.run_test(&s, 0).await;
        // exactly one failure, classified red
        assert_eq!(
            h.sink.reds(),
            ["Test FAILED: 5.000 not in expected range [10.000, 20.000]"]
        );
        // everything else came through in order, the comment muted
        let lines = h.sink.lines();
        assert_eq!(lines.first().map(String::as_str), Some("Test: T"));
        assert!(lines.contains(&"# setup note".to_string()));
    }

    #[tokio::test]
    async fn unknown_directive_always_fails() {
        let mut h = harness();
        let s = script("test T\nfrobnicate 1 2\n");

        h.engine.run_test(&s, 0).await;
        assert!(h.engine.saw_error());
        assert!(h.sink.contains("Unknown directive: frobnicate 1 2"));
    }

    #[tokio::test]
    async fn metadata_commands_update_current_test_state() {
        let mut h = harness();
        let s = script("test Cal\ndesc Calibration check\nunits volts\n");

        h.engine.run_test(&s, 0).await;
        assert_eq!(h.engine.current_test(), "Cal");
        assert_eq!(h.engine.current_desc(), "Calibration check");
        assert_eq!(h.engine.current_units(), "volts");
        assert!(h.sink.contains("TestDesc: Calibration check"));
    }

    #[tokio::test]
    async fn second_test_does_not_see_first_tests_commands() {
        let mut h = harness();
        let s = script("test One\nsendline_a FIRST\ntest Two\nsleep 1\n");

        h.engine.run_test(&s, 1).await;
        assert!(!h.engine.saw_error());
        assert_eq!(h.channel_a.written_text(), "");
    }
}
