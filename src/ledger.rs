use std::sync::Arc;

use rust_decimal::Decimal;
use time::{Date, OffsetDateTime};

use caja_core::{
    checked_sum, Actor, AuditFact, AuditSink, AutoCloseFailure, AutoCloseReport, Clock, ConflictError,
    InsertMovementCommand, LedgerError, LedgerStore, LedgerTx, Movement, MovementSource,
    NewMovement, Register, RegisterSummary, StorageError,
};

/// Which closed registers may be reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReopenPolicy {
    /// Only today's register. Historical closings stay untouched.
    #[default]
    CurrentDayOnly,
    AnyDate,
}

#[derive(Debug, Clone)]
pub struct LedgerOptions {
    pub reopen_policy: ReopenPolicy,
    /// Recorded as the closing actor of registers closed by the sweep.
    pub system_actor: Actor,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            reopen_policy: ReopenPolicy::CurrentDayOnly,
            system_actor: Actor::system("auto-close"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Write,
}

/// Opens, closes and reopens daily registers and records movements against them.
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    options: LedgerOptions,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, audit: Arc<dyn AuditSink>, clock: Arc<dyn Clock>, options: LedgerOptions) -> Self {
        Self {
            store,
            audit,
            clock,
            options,
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn options(&self) -> &LedgerOptions {
        &self.options
    }

    /// Runs `body` in one unit of work and commits it. A transient storage failure
    /// reruns the whole unit once; anything else is returned after rollback.
    pub(crate) fn transaction<T, F>(&self, op: &'static str, body: F) -> Result<T, LedgerError>
    where
        F: FnMut(&mut dyn LedgerTx) -> Result<T, LedgerError>,
    {
        self.with_retry(op, Access::Write, body)
    }

    /// Same as [`Self::transaction`] for bodies that never write.
    pub(crate) fn read<T, F>(&self, op: &'static str, body: F) -> Result<T, LedgerError>
    where
        F: FnMut(&mut dyn LedgerTx) -> Result<T, LedgerError>,
    {
        self.with_retry(op, Access::Read, body)
    }

    fn with_retry<T, F>(&self, op: &'static str, access: Access, mut body: F) -> Result<T, LedgerError>
    where
        F: FnMut(&mut dyn LedgerTx) -> Result<T, LedgerError>,
    {
        match self.run_once(access, &mut body) {
            Err(e) if e.is_transient() => {
                tracing::warn!(op, error = %e, "Transient storage failure, retrying");
                metrics::increment_counter!("caja_transaction_retries_total", "op" => op);
                self.run_once(access, &mut body)
            }
            other => other,
        }
    }

    fn run_once<T, F>(&self, access: Access, body: &mut F) -> Result<T, LedgerError>
    where
        F: FnMut(&mut dyn LedgerTx) -> Result<T, LedgerError>,
    {
        let mut tx = match access {
            Access::Write => self.store.begin()?,
            Access::Read => self.store.begin_read()?,
        };
        let value = body(tx.as_mut())?;
        tx.commit()?;
        Ok(value)
    }

    pub(crate) fn record(&self, actor: &Actor, action: &'static str, entity_type: &'static str, entity_id: impl ToString, detail: impl Into<String>) {
        self.audit.record(AuditFact {
            actor: actor.clone(),
            action,
            entity_type,
            entity_id: entity_id.to_string(),
            detail: detail.into(),
            timestamp: self.clock.now(),
        });
    }

    pub fn open_register(&self, date: Date, opening_balance: Decimal, actor: &Actor) -> Result<Register, LedgerError> {
        let now = self.clock.now();
        let register = self.transaction("open_register", |tx| {
            if tx.register_for_update(date)?.is_some() {
                return Err(ConflictError::AlreadyExists(date).into());
            }
            let register = Register::open(date, opening_balance, actor.clone(), now);
            tx.insert_register(&register).map_err(|e| match e {
                StorageError::EntityAlreadyExists(_) => ConflictError::AlreadyExists(date).into(),
                other => LedgerError::from(other),
            })?;
            Ok(register)
        })?;

        tracing::info!(%date, %opening_balance, actor = %actor, "Register opened");
        self.record(actor, "register.open", "register", date, format!("opening balance {}", opening_balance));
        Ok(register)
    }

    /// Closes with the computed balance, or with `closing_override` as an administrative correction.
    pub fn close_register(&self, date: Date, actor: &Actor, closing_override: Option<Decimal>) -> Result<Register, LedgerError> {
        let now = self.clock.now();
        let register = self.transaction("close_register", |tx| {
            let register = tx
                .register_for_update(date)?
                .ok_or_else(|| LedgerError::NotFound(format!("register {}", date)))?;
            close_in(tx, register, actor, closing_override, now)
        })?;

        let closing = register.closing_balance.unwrap_or_default();
        match closing_override {
            Some(_) => {
                tracing::warn!(%date, %closing, actor = %actor, "Register closed with overridden balance");
                metrics::increment_counter!("caja_registers_closed_total", "mode" => "override");
                self.record(actor, "register.close_override", "register", date, format!("closing balance set to {}", closing));
            }
            None => {
                tracing::info!(%date, %closing, actor = %actor, "Register closed");
                metrics::increment_counter!("caja_registers_closed_total", "mode" => "manual");
                self.record(actor, "register.close", "register", date, format!("closing balance {}", closing));
            }
        }
        Ok(register)
    }

    pub fn reopen_register(&self, date: Date, actor: &Actor) -> Result<Register, LedgerError> {
        let today = self.clock.today();
        let policy = self.options.reopen_policy;
        let register = self.transaction("reopen_register", |tx| {
            let mut register = tx
                .register_for_update(date)?
                .ok_or_else(|| LedgerError::NotFound(format!("register {}", date)))?;
            if !register.closed {
                return Err(ConflictError::NotClosed(date).into());
            }
            if policy == ReopenPolicy::CurrentDayOnly && date != today {
                return Err(ConflictError::ReopenNotAllowed(date).into());
            }
            register.closed = false;
            register.closing_balance = None;
            register.closed_by = None;
            register.closed_at = None;
            register.balance_overridden = false;
            tx.update_register(&register)?;
            Ok(register)
        })?;

        tracing::info!(%date, actor = %actor, "Register reopened");
        self.record(actor, "register.reopen", "register", date, "closing balance cleared");
        Ok(register)
    }

    /// Closes every register still open on a date before `today`. One register failing
    /// does not stop the others; failures are listed in the report. Safe to rerun.
    pub fn auto_close_stale(&self, today: Date, system_actor: &Actor) -> Result<AutoCloseReport, LedgerError> {
        let stale = self.read("list_stale_registers", |tx| Ok(tx.open_registers_before(today)?))?;
        let now = self.clock.now();

        let mut report = AutoCloseReport::default();
        for date in stale {
            let result = self.transaction("auto_close_register", |tx| {
                match tx.register_for_update(date)? {
                    Some(register) if register.is_open() => close_in(tx, register, system_actor, None, now).map(Some),
                    _ => Ok(None),
                }
            });

            match result {
                Ok(Some(register)) => {
                    let closing = register.closing_balance.unwrap_or_default();
                    tracing::info!(%date, %closing, "Stale register auto-closed");
                    metrics::increment_counter!("caja_registers_closed_total", "mode" => "auto");
                    self.record(system_actor, "register.auto_close", "register", date, format!("closing balance {}", closing));
                    report.closed.push(register);
                }
                Ok(None) => {
                    tracing::debug!(%date, "Register already closed by someone else");
                }
                Err(e) => {
                    tracing::warn!(%date, error = %e, "Failed to auto-close register");
                    report.failed.push(AutoCloseFailure {
                        date,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.count = report.closed.len();
        Ok(report)
    }

    /// Hook for a session start: sweeps stale registers before the user can record anything.
    pub fn on_session_start(&self, user: &Actor) -> Result<AutoCloseReport, LedgerError> {
        let report = self.auto_close_stale(self.clock.today(), &self.options.system_actor)?;
        if report.count > 0 || !report.failed.is_empty() {
            tracing::info!(user = %user, closed = report.count, failed = report.failed.len(), "Session start sweep finished");
        }
        Ok(report)
    }

    /// Records a cash adjustment that belongs to no receipt or expense.
    pub fn insert_movement(&self, date: Date, command: &InsertMovementCommand, actor: &Actor) -> Result<Movement, LedgerError> {
        let now = self.clock.now();
        let new = NewMovement {
            date,
            kind: command.kind,
            amount: command.amount,
            description: command.description.clone(),
            payment_method: command.payment_method.clone(),
            source: MovementSource::Manual,
        };
        let movement = self.transaction("insert_movement", |tx| append_movement(tx, &new, now))?;

        tracing::info!(%date, id = movement.id, kind = movement.kind.as_str(), amount = %movement.amount, "Movement recorded");
        self.record(
            actor,
            "movement.insert",
            "movement",
            movement.id,
            format!("{} {} on {}", movement.kind.as_str(), movement.amount, date),
        );
        Ok(movement)
    }

    pub fn summary(&self, date: Date, page: usize, page_size: usize) -> Result<RegisterSummary, LedgerError> {
        self.read("summary", |tx| {
            let register = tx
                .register(date)?
                .ok_or_else(|| LedgerError::NotFound(format!("register {}", date)))?;
            let movements = tx.movements_for_date(date)?;
            RegisterSummary::build(register, movements, page, page_size)
        })
    }
}

/// Fails with `RegisterNotOpen` unless `date` has an open register, locking its row.
pub(crate) fn require_open(tx: &mut dyn LedgerTx, date: Date) -> Result<Register, LedgerError> {
    match tx.register_for_update(date)? {
        Some(register) if register.is_open() => Ok(register),
        _ => Err(ConflictError::RegisterNotOpen(date).into()),
    }
}

/// Appends a movement to its date's open register with the next running balance.
pub(crate) fn append_movement(tx: &mut dyn LedgerTx, movement: &NewMovement, now: OffsetDateTime) -> Result<Movement, LedgerError> {
    if movement.amount <= Decimal::ZERO {
        return Err(LedgerError::Validation(format!("movement amount must be positive, got {}", movement.amount)));
    }
    let register = require_open(tx, movement.date)?;
    let previous = tx
        .last_running_balance(movement.date)?
        .unwrap_or(register.opening_balance);
    let running_balance = previous
        .checked_add(movement.kind.signed(movement.amount))
        .ok_or_else(LedgerError::out_of_range)?;
    let stored = tx.insert_movement(movement, running_balance, now)?;
    metrics::increment_counter!("caja_movements_inserted_total", "kind" => movement.kind.as_str());
    Ok(stored)
}

fn close_in(tx: &mut dyn LedgerTx, mut register: Register, actor: &Actor, closing_override: Option<Decimal>, now: OffsetDateTime) -> Result<Register, LedgerError> {
    if register.closed {
        return Err(ConflictError::AlreadyClosed(register.date).into());
    }
    let closing = match closing_override {
        Some(closing) => closing,
        None => {
            let movements = tx.movements_for_date(register.date)?;
            checked_sum(std::iter::once(register.opening_balance).chain(movements.iter().map(Movement::signed_amount)))
                .ok_or_else(LedgerError::out_of_range)?
        }
    };
    register.closing_balance = Some(closing);
    register.closed = true;
    register.closed_by = Some(actor.clone());
    register.closed_at = Some(now);
    register.balance_overridden = closing_override.is_some();
    tx.update_register(&register)?;
    Ok(register)
}
