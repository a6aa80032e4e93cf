//! Per-room worker task.
//!
//! Every room is owned by exactly one tokio task. All mutation flows through
//! the room's command queue, so state access needs no locks and every timer
//! firing, answer, and host command is applied in a single serialized stream.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{UserId, UserIdentity};
use crate::config::AppConfig;
use crate::dao::store::QuizStore;
use crate::dto::room::RoomSummary;
use crate::dto::ws::{QuestionPublic, QuestionReveal, ServerEvent};
use crate::error::ServiceError;
use crate::services::finalizer;
use crate::state::Connection;
use crate::state::leaderboard::{final_standings, live_standings};
use crate::state::lifecycle::{FinishReason, RoomEvent, RoomStatus};
use crate::state::room::{AnswerValue, JoinOutcome, QuestionPhase, Room};
use crate::state::timer::{TimerFire, TimerKind, TimerSet};

/// Identity and reply channel of the connection issuing a command.
///
/// Rejections go straight back over `conn`, so even a caller with no
/// participant record in the room gets their error event.
#[derive(Clone)]
pub struct Caller {
    /// Resolved identity of the issuer.
    pub identity: UserIdentity,
    /// Socket connection the issuer can be answered on.
    pub conn: Connection,
}

impl Caller {
    /// Stable user id of the issuer.
    pub fn id(&self) -> UserId {
        self.identity.id
    }
}

/// Commands accepted by a room worker.
pub enum RoomCommand {
    /// Attach a participant (or reattach a disconnected one).
    Join {
        /// Joining connection.
        caller: Caller,
        /// Outcome reply to the websocket handler.
        reply: oneshot::Sender<Result<JoinOutcome, ServiceError>>,
    },
    /// Toggle a lobby ready flag.
    Ready {
        /// Acting connection.
        caller: Caller,
        /// Desired ready state.
        ready: bool,
    },
    /// Host starts the quiz.
    StartQuiz {
        /// Acting connection.
        caller: Caller,
    },
    /// Answer submission for the open question.
    SubmitAnswer {
        /// Acting connection.
        caller: Caller,
        /// Question being answered.
        question_index: usize,
        /// Submitted option index or text.
        value: AnswerValue,
        /// Client-reported seconds taken.
        time_taken_secs: f64,
    },
    /// Host skips the review pause.
    NextQuestion {
        /// Acting connection.
        caller: Caller,
    },
    /// Host ends the quiz early.
    EndQuiz {
        /// Acting connection.
        caller: Caller,
    },
    /// Host freezes the current question.
    Pause {
        /// Acting connection.
        caller: Caller,
    },
    /// Host reopens the frozen question.
    Resume {
        /// Acting connection.
        caller: Caller,
    },
    /// Host removes a participant.
    Kick {
        /// Acting connection.
        caller: Caller,
        /// Participant to remove.
        target: UserId,
    },
    /// Participant left or their socket dropped.
    Disconnected {
        /// Affected participant.
        user_id: UserId,
        /// Socket that closed; `None` for an explicit leave.
        conn_id: Option<Uuid>,
    },
    /// Snapshot request from the REST layer.
    Summary {
        /// Snapshot reply.
        reply: oneshot::Sender<RoomSummary>,
    },
    /// A timer armed by this room fired.
    Timer(TimerFire),
}

impl From<TimerFire> for RoomCommand {
    fn from(fire: TimerFire) -> Self {
        RoomCommand::Timer(fire)
    }
}

/// Cheap handle used to talk to a room worker from anywhere.
#[derive(Clone)]
pub struct RoomHandle {
    code: String,
    tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    /// Room code this handle points at.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Queue a command for the worker.
    pub fn send(&self, command: RoomCommand) -> Result<(), ServiceError> {
        self.tx.send(command).map_err(|_| ServiceError::RoomClosed)
    }

    /// Join the room and wait for the outcome.
    pub async fn join(&self, caller: Caller) -> Result<JoinOutcome, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Join { caller, reply })?;
        rx.await.map_err(|_| ServiceError::RoomClosed)?
    }

    /// Fetch a public snapshot of the room.
    pub async fn summary(&self) -> Result<RoomSummary, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Summary { reply })?;
        rx.await.map_err(|_| ServiceError::RoomClosed)
    }

    /// Whether the worker behind this handle has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the worker task for a freshly created room.
pub fn spawn_room(room: Room, config: AppConfig, store: Arc<dyn QuizStore>) -> RoomHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = RoomHandle {
        code: room.code.clone(),
        tx: tx.clone(),
    };

    let actor = RoomActor {
        timers: TimerSet::new(tx),
        room,
        config,
        store,
        rx,
    };
    tokio::spawn(actor.run());
    handle
}

struct RoomActor {
    room: Room,
    config: AppConfig,
    store: Arc<dyn QuizStore>,
    timers: TimerSet<RoomCommand>,
    rx: mpsc::UnboundedReceiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        info!(code = %self.room.code, quiz = %self.room.quiz.title, "room worker started");
        while let Some(command) = self.rx.recv().await {
            if self.handle(command).is_break() {
                break;
            }
        }
        info!(code = %self.room.code, status = ?self.room.status, "room worker stopped");
    }

    fn handle(&mut self, command: RoomCommand) -> ControlFlow<()> {
        match command {
            RoomCommand::Join { caller, reply } => {
                let _ = reply.send(self.join(caller));
            }
            RoomCommand::Ready { caller, ready } => {
                let user_id = caller.id();
                let result = self.room.set_ready(user_id, ready).map(|()| {
                    self.room
                        .broadcast(&ServerEvent::ParticipantReady { user_id, ready });
                });
                self.report(&caller, result);
            }
            RoomCommand::StartQuiz { caller } => {
                let result = self.start_quiz(caller.id());
                self.report(&caller, result);
            }
            RoomCommand::SubmitAnswer {
                caller,
                question_index,
                value,
                time_taken_secs,
            } => {
                let result =
                    self.submit_answer(caller.id(), question_index, value, time_taken_secs);
                self.report(&caller, result);
            }
            RoomCommand::NextQuestion { caller } => {
                let result = self.next_question(caller.id());
                self.report(&caller, result);
            }
            RoomCommand::EndQuiz { caller } => {
                let result = self.end_quiz(caller.id());
                self.report(&caller, result);
            }
            RoomCommand::Pause { caller } => {
                let result = self.pause(caller.id());
                self.report(&caller, result);
            }
            RoomCommand::Resume { caller } => {
                let result = self.resume(caller.id());
                self.report(&caller, result);
            }
            RoomCommand::Kick { caller, target } => {
                let result = self.kick(caller.id(), target);
                self.report(&caller, result);
            }
            RoomCommand::Disconnected { user_id, conn_id } => {
                self.disconnected(user_id, conn_id);
            }
            RoomCommand::Summary { reply } => {
                let _ = reply.send(RoomSummary::from(&self.room));
            }
            RoomCommand::Timer(fire) => return self.timer(fire),
        }
        ControlFlow::Continue(())
    }

    /// Deliver an operation failure to the connection that issued it.
    ///
    /// The reply goes over the caller's own channel rather than the roster, so
    /// rejections reach callers without a participant record too.
    fn report(&self, caller: &Caller, result: Result<(), ServiceError>) {
        if let Err(err) = result {
            debug!(code = %self.room.code, user_id = %caller.id(), error = %err, "room command rejected");
            let _ = caller.conn.tx.send(ServerEvent::error(&err));
        }
    }

    fn timer(&mut self, fire: TimerFire) -> ControlFlow<()> {
        if !self.timers.is_current(&fire) {
            debug!(code = %self.room.code, kind = ?fire.kind, "dropping stale timer firing");
            return ControlFlow::Continue(());
        }

        match fire.kind {
            TimerKind::CountdownTick { remaining } => self.countdown_tick(remaining),
            TimerKind::QuestionDeadline { index } => self.close_question(index, true),
            TimerKind::ReviewPause { next_index } => {
                if self.room.status == RoomStatus::Active {
                    self.open_question(next_index);
                }
            }
            TimerKind::Teardown => {
                info!(code = %self.room.code, "teardown grace elapsed");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn join(&mut self, caller: Caller) -> Result<JoinOutcome, ServiceError> {
        if self.room.status.is_terminal() {
            return Err(ServiceError::RoomClosed);
        }

        let user_id = caller.id();
        let username = caller.identity.username.clone();
        let outcome = self.room.join(caller.identity, caller.conn)?;

        self.room.broadcast(&ServerEvent::ParticipantJoined {
            user_id,
            username,
            rejoined: outcome == JoinOutcome::Rejoined,
            participant_count: self.room.active_count(),
        });
        self.room.send_to(user_id, &self.room_state_event());
        self.broadcast_leaderboard();
        Ok(outcome)
    }

    fn start_quiz(&mut self, user_id: UserId) -> Result<(), ServiceError> {
        self.room.ensure_host(user_id)?;
        self.room.status = self.room.status.transition(RoomEvent::Start)?;
        self.room.started_at = Some(OffsetDateTime::now_utc());
        self.room.begin_playing();
        self.timers.invalidate();

        let seconds = self.config.countdown_secs;
        if seconds == 0 {
            self.begin_questions();
        } else {
            self.room
                .broadcast(&ServerEvent::Countdown { seconds_left: seconds });
            self.timers.arm(
                TimerKind::CountdownTick {
                    remaining: seconds - 1,
                },
                Duration::from_secs(1),
            );
        }
        Ok(())
    }

    fn countdown_tick(&mut self, remaining: u32) {
        if self.room.status != RoomStatus::Starting {
            return;
        }
        if remaining == 0 {
            self.begin_questions();
            return;
        }

        self.room.broadcast(&ServerEvent::Countdown {
            seconds_left: remaining,
        });
        self.timers.arm(
            TimerKind::CountdownTick {
                remaining: remaining - 1,
            },
            Duration::from_secs(1),
        );
    }

    fn begin_questions(&mut self) {
        match self.room.status.transition(RoomEvent::CountdownElapsed) {
            Ok(status) => self.room.status = status,
            Err(err) => {
                warn!(code = %self.room.code, error = %err, "countdown elapsed in unexpected status");
                return;
            }
        }
        self.room.broadcast(&ServerEvent::QuizStarted {
            question_count: self.room.quiz.questions.len(),
        });
        self.open_question(0);
    }

    /// Open a question for answers and arm its deadline.
    fn open_question(&mut self, index: usize) {
        let total = self.room.quiz.questions.len();
        let Some(question) = self.room.question(index) else {
            self.finish(FinishReason::QuestionsExhausted);
            return;
        };

        let public = QuestionPublic::new(index, total, question);
        let limit = u64::from(question.time_limit_secs);
        self.room.open_question(index);
        self.room
            .broadcast(&ServerEvent::NewQuestion { question: public });

        self.timers.invalidate();
        self.timers.arm(
            TimerKind::QuestionDeadline { index },
            Duration::from_secs(limit),
        );
    }

    fn submit_answer(
        &mut self,
        user_id: UserId,
        question_index: usize,
        value: AnswerValue,
        time_taken_secs: f64,
    ) -> Result<(), ServiceError> {
        let accepted = self
            .room
            .submit_answer(user_id, question_index, value, time_taken_secs)?;

        self.room.send_to(
            user_id,
            &ServerEvent::AnswerFeedback {
                question_index,
                correct: accepted.correct,
                points: accepted.points,
                score: accepted.score,
                streak: accepted.streak,
                correct_answer: accepted.correct_text,
            },
        );
        self.broadcast_leaderboard();

        if self.room.all_active_answered(question_index) {
            self.close_question(question_index, false);
        }
        Ok(())
    }

    /// Close a question and schedule what follows.
    ///
    /// Both the deadline timer and the everyone-answered path land here; the
    /// phase check makes whichever arrives second a no-op, so the race between
    /// them cannot double-close a question.
    fn close_question(&mut self, index: usize, timed_out: bool) {
        let Some(current) = self.room.current else {
            return;
        };
        if current.index != index || current.phase != QuestionPhase::Active {
            return;
        }

        self.room.current = Some(crate::state::room::CurrentQuestion {
            phase: QuestionPhase::Answered,
            ..current
        });
        self.room.reset_streaks_for_unanswered(index);

        let answered_count = self.room.answered_count(index);
        let Some(question) = self.room.question(index) else {
            return;
        };
        let reveal = QuestionReveal {
            question_index: index,
            correct_answer: question
                .correct_option()
                .map(|option| option.text.clone())
                .unwrap_or_default(),
            correct_index: question.correct_index(),
            explanation: question.explanation.clone(),
            answered_count,
        };
        let event = if timed_out {
            ServerEvent::QuestionTimeUp { reveal }
        } else {
            ServerEvent::QuestionComplete { reveal }
        };
        self.room.broadcast(&event);
        self.broadcast_leaderboard();

        self.timers.invalidate();
        let next = index + 1;
        if next < self.room.quiz.questions.len() {
            if let Some(current) = &mut self.room.current {
                current.phase = QuestionPhase::Review;
            }
            self.timers.arm(
                TimerKind::ReviewPause { next_index: next },
                Duration::from_secs(self.config.review_pause_secs),
            );
        } else {
            self.finish(FinishReason::QuestionsExhausted);
        }
    }

    fn next_question(&mut self, user_id: UserId) -> Result<(), ServiceError> {
        self.room.ensure_host(user_id)?;
        if self.room.status != RoomStatus::Active {
            return Err(ServiceError::SessionNotActive);
        }

        let current = self
            .room
            .current
            .ok_or(ServiceError::SessionNotActive)?;
        match current.phase {
            QuestionPhase::Answered | QuestionPhase::Review => {
                self.open_question(current.index + 1);
                Ok(())
            }
            QuestionPhase::Active | QuestionPhase::Pending => Err(ServiceError::InvalidInput(
                "the current question is still open".into(),
            )),
        }
    }

    fn end_quiz(&mut self, user_id: UserId) -> Result<(), ServiceError> {
        self.room.ensure_host(user_id)?;
        match self.room.status {
            RoomStatus::Waiting | RoomStatus::Starting => self.cancel(),
            RoomStatus::Active | RoomStatus::Paused => {
                self.finish(FinishReason::HostEnded);
                Ok(())
            }
            status => Err(ServiceError::InvalidTransition(
                status
                    .transition(RoomEvent::Finish(FinishReason::HostEnded))
                    .unwrap_err(),
            )),
        }
    }

    /// Abandon a room that never reached active play. No results exist.
    fn cancel(&mut self) -> Result<(), ServiceError> {
        self.room.status = self.room.status.transition(RoomEvent::Cancel)?;
        self.room.ended_at = Some(OffsetDateTime::now_utc());
        self.room.broadcast(&ServerEvent::QuizEnded {
            reason: FinishReason::HostEnded,
            standings: Vec::new(),
            duration_secs: None,
        });
        self.timers.invalidate();
        self.timers.arm(
            TimerKind::Teardown,
            Duration::from_secs(self.config.teardown_grace_secs),
        );
        Ok(())
    }

    fn pause(&mut self, user_id: UserId) -> Result<(), ServiceError> {
        self.room.ensure_host(user_id)?;
        self.room.status = self.room.status.transition(RoomEvent::Pause)?;
        self.timers.invalidate();

        if let Some(current) = &mut self.room.current {
            if current.phase == QuestionPhase::Active {
                // Frozen; resume reopens it with a full fresh window.
                current.phase = QuestionPhase::Pending;
                current.deadline = None;
            }
        }
        self.room.broadcast(&ServerEvent::Paused);
        Ok(())
    }

    fn resume(&mut self, user_id: UserId) -> Result<(), ServiceError> {
        self.room.ensure_host(user_id)?;
        self.room.status = self.room.status.transition(RoomEvent::Resume)?;
        self.room.broadcast(&ServerEvent::Resumed);

        match self.room.current {
            Some(current) if current.phase == QuestionPhase::Pending => {
                self.open_question(current.index);
            }
            Some(current)
                if matches!(
                    current.phase,
                    QuestionPhase::Answered | QuestionPhase::Review
                ) =>
            {
                self.timers.invalidate();
                self.timers.arm(
                    TimerKind::ReviewPause {
                        next_index: current.index + 1,
                    },
                    Duration::from_secs(self.config.review_pause_secs),
                );
            }
            _ => {}
        }
        Ok(())
    }

    fn kick(&mut self, user_id: UserId, target: UserId) -> Result<(), ServiceError> {
        let target_conn = self
            .room
            .participants
            .get(&target)
            .and_then(|participant| participant.conn.clone());
        let username = self
            .room
            .participants
            .get(&target)
            .map(|participant| participant.identity.username.clone())
            .unwrap_or_default();

        self.room.kick(user_id, target)?;

        let event = ServerEvent::ParticipantKicked {
            user_id: target,
            username,
        };
        if let Some(conn) = target_conn {
            let _ = conn.tx.send(event.clone());
        }
        self.room.broadcast(&event);
        self.broadcast_leaderboard();
        self.maybe_close_after_roster_change();
        Ok(())
    }

    fn disconnected(&mut self, user_id: UserId, conn_id: Option<Uuid>) {
        if !self.room.mark_disconnected(user_id, conn_id) {
            return;
        }

        let username = self
            .room
            .participants
            .get(&user_id)
            .map(|participant| participant.identity.username.clone())
            .unwrap_or_default();
        info!(code = %self.room.code, %user_id, "participant disconnected");

        if matches!(
            self.room.status,
            RoomStatus::Starting | RoomStatus::Active | RoomStatus::Paused
        ) {
            self.room
                .broadcast(&ServerEvent::ParticipantDisconnected { user_id, username });
        }
        self.broadcast_leaderboard();
        self.maybe_close_after_roster_change();
    }

    /// A shrink of the connected roster can complete an open question.
    fn maybe_close_after_roster_change(&mut self) {
        if self.room.status != RoomStatus::Active {
            return;
        }
        let Some(current) = self.room.current else {
            return;
        };
        if current.phase == QuestionPhase::Active && self.room.all_active_answered(current.index) {
            self.close_question(current.index, false);
        }
    }

    fn finish(&mut self, reason: FinishReason) {
        let next = match self.room.status.transition(RoomEvent::Finish(reason)) {
            Ok(next) => next,
            Err(err) => {
                warn!(code = %self.room.code, error = %err, "finish requested in unexpected status");
                return;
            }
        };
        self.room.status = next;
        let finished_at = OffsetDateTime::now_utc();
        self.room.ended_at = Some(finished_at);
        if let Some(current) = &mut self.room.current {
            current.phase = QuestionPhase::Answered;
        }
        for participant in self.room.participants.values_mut() {
            if participant.status == crate::state::room::ParticipantStatus::Playing {
                participant.status = crate::state::room::ParticipantStatus::Finished;
            }
        }

        let standings = final_standings(&self.room.participants);
        self.room.broadcast(&ServerEvent::QuizEnded {
            reason,
            standings: standings.clone(),
            duration_secs: self.room.duration_secs(),
        });

        let records = finalizer::build_results(&self.room, &standings, finished_at);
        let store = self.store.clone();
        let code = self.room.code.clone();
        info!(code = %code, participants = records.len(), ?reason, "quiz finished, persisting results");
        // Persistence runs detached so a slow store cannot block teardown.
        tokio::spawn(async move {
            finalizer::persist(store, &code, records).await;
        });

        self.timers.invalidate();
        self.timers.arm(
            TimerKind::Teardown,
            Duration::from_secs(self.config.teardown_grace_secs),
        );
    }

    fn broadcast_leaderboard(&self) {
        self.room.broadcast(&ServerEvent::LeaderboardUpdate {
            standings: live_standings(&self.room.participants),
        });
    }

    /// Snapshot event bringing a (re)joining client fully up to date.
    fn room_state_event(&self) -> ServerEvent {
        let total = self.room.quiz.questions.len();
        let active = self
            .room
            .current
            .filter(|current| current.phase == QuestionPhase::Active);

        let question = active.and_then(|current| {
            self.room
                .question(current.index)
                .map(|question| QuestionPublic::new(current.index, total, question))
        });
        let seconds_remaining = active.and_then(|current| current.deadline).map(|deadline| {
            (deadline - OffsetDateTime::now_utc())
                .whole_seconds()
                .max(0) as u64
        });

        ServerEvent::RoomState {
            status: self.room.status,
            question,
            seconds_remaining,
            standings: live_standings(&self.room.participants),
        }
    }
}
