//! Drives one object through create, read, update and delete.

use serde_json::Value;
use tracing::{info_span, Instrument};

use super::lookup::LookupFilter;
use super::session::{ConvergenceSession, Operation, Phase, ReadBackPolicy, Timeouts};
use crate::assignment::{carry_unrecognized, diff, resolve, Assignment, AssignmentReconciler, AssignmentSpec};
use crate::classify::{diagnose, ErrorKind};
use crate::client::{listing_items, Transport};
use crate::error::{OperationError, Step, ValidationError};
use crate::kinds::{redact, DesiredObject, KindDescriptor, ObjectMapper};
use crate::value::Field;

/// A request ready to send: the primary body plus the assignment set to
/// replace, if the desired state manages assignments.
struct Prepared {
    body: Value,
    assignments: Option<Vec<Assignment>>,
}

/// Converges objects of one kind against a remote API.
///
/// Operations never retry writes. Only the read-back after a write retries,
/// within [`ReadBackPolicy`] and the operation deadline. Independent objects
/// may be converged concurrently through a shared controller.
pub struct Controller<M: ObjectMapper, T: Transport> {
    mapper: M,
    transport: T,
    timeouts: Timeouts,
    read_back: ReadBackPolicy,
}

impl<M: ObjectMapper, T: Transport> Controller<M, T> {
    pub fn new(mapper: M, transport: T) -> Self {
        Self {
            mapper,
            transport,
            timeouts: Timeouts::default(),
            read_back: ReadBackPolicy::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_read_back(mut self, read_back: ReadBackPolicy) -> Self {
        self.read_back = read_back;
        self
    }

    pub fn descriptor(&self) -> &KindDescriptor {
        self.mapper.descriptor()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn kind(&self) -> &'static str {
        self.mapper.descriptor().name
    }

    fn session(&self, operation: Operation) -> ConvergenceSession {
        ConvergenceSession::new(operation, self.descriptor(), &self.timeouts, self.read_back)
    }

    /// Creates the object and returns its tracked state.
    pub async fn create(&self, desired: &M::Desired) -> Result<M::Desired, OperationError> {
        let span = info_span!(
            "converge.create",
            kind = self.kind(),
            object_id = tracing::field::Empty
        );
        self.run_create(desired).instrument(span).await
    }

    /// Reads the object. `Ok(None)` means it no longer exists and should be
    /// dropped from tracked state.
    pub async fn read(&self, state: &M::Desired) -> Result<Option<M::Desired>, OperationError> {
        let span = info_span!(
            "converge.read",
            kind = self.kind(),
            object_id = state.id().as_str().unwrap_or_default()
        );
        self.run_read(state).instrument(span).await
    }

    /// Updates the object tracked as `prior` to match `desired`.
    pub async fn update(
        &self,
        desired: &M::Desired,
        prior: &M::Desired,
    ) -> Result<M::Desired, OperationError> {
        let span = info_span!(
            "converge.update",
            kind = self.kind(),
            object_id = prior.id().as_str().unwrap_or_default()
        );
        self.run_update(desired, prior).instrument(span).await
    }

    /// Deletes the object. An object that is already gone counts as deleted.
    pub async fn delete(&self, state: &M::Desired) -> Result<(), OperationError> {
        let span = info_span!(
            "converge.delete",
            kind = self.kind(),
            object_id = state.id().as_str().unwrap_or_default()
        );
        self.run_delete(state).instrument(span).await
    }

    /// Finds existing objects of this kind without tracking them.
    ///
    /// An id filter fetches the object directly; the other filters list the
    /// collection and match locally. Assignments and write-only fields are
    /// not part of the results.
    pub async fn lookup(&self, filter: &LookupFilter) -> Result<Vec<M::Desired>, OperationError> {
        let span = info_span!("converge.lookup", kind = self.kind(), filter = %filter);
        self.run_lookup(filter).instrument(span).await
    }

    /// Creates the object when nothing is tracked yet, otherwise updates it.
    pub async fn apply(
        &self,
        desired: &M::Desired,
        tracked: Option<&M::Desired>,
    ) -> Result<M::Desired, OperationError> {
        match tracked {
            Some(prior) => self.update(desired, prior).await,
            None => self.create(desired).await,
        }
    }

    async fn run_create(&self, desired: &M::Desired) -> Result<M::Desired, OperationError> {
        let kind = self.kind();
        let mut session = self.session(Operation::Create);

        session.advance(Phase::Constructing);
        let mut planned = desired.clone();
        planned.mark_computed_unknown();
        let prepared = self.prepare(&planned, false, None).map_err(|e| session.fail(e))?;

        session.advance(Phase::Writing);
        let collection = self.descriptor().collection_path;
        let response = session
            .call(Step::Write, self.transport.post(collection, &prepared.body))
            .await
            .map_err(|e| session.fail(e))?;

        let id = response
            .as_ref()
            .and_then(|body| body.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                session.fail(OperationError::new(
                    Step::Write,
                    ErrorKind::Malformed,
                    kind,
                    "create response carried no id",
                ))
            })?;
        tracing::Span::current().record("object_id", id.as_str());
        log::info!("Created {} {}", kind, id);
        planned.set_id(Field::Concrete(id.clone()));

        if let Some(assignments) = &prepared.assignments {
            session.advance(Phase::AssigningSubResources);
            if let Err(e) = self.assign(&session, &id, assignments).await {
                log::warn!(
                    "{} {} was created but its assignments were not applied; the object is left in place",
                    kind,
                    id
                );
                return Err(session.fail(e));
            }
        }

        let state = self
            .read_back(&mut session, &id, &planned)
            .await
            .map_err(|e| session.fail(e))?;
        session.advance(Phase::Converged);
        Ok(state)
    }

    async fn run_read(&self, state: &M::Desired) -> Result<Option<M::Desired>, OperationError> {
        let kind = self.kind();
        let mut session = self.session(Operation::Read);
        let id = tracked_id(kind, state, None).map_err(|e| session.fail(e))?;

        session.advance(Phase::ReadingBack);
        let current = self
            .fetch(&session, Step::Read, &id, state)
            .await
            .map_err(|e| session.fail(e))?;

        if current.is_none() {
            log::info!("{} {} no longer exists; dropping it from tracked state", kind, id);
        }
        session.advance(Phase::Converged);
        Ok(current)
    }

    async fn run_update(
        &self,
        desired: &M::Desired,
        prior: &M::Desired,
    ) -> Result<M::Desired, OperationError> {
        let kind = self.kind();
        let mut session = self.session(Operation::Update);

        session.advance(Phase::Constructing);
        let id = tracked_id(kind, prior, Some(desired)).map_err(|e| session.fail(e))?;
        let mut planned = desired.clone();
        planned.set_id(Field::Concrete(id.clone()));
        planned.mark_computed_unknown();
        let prepared = self
            .prepare(&planned, true, Some(prior))
            .map_err(|e| session.fail(e))?;

        session.advance(Phase::Writing);
        let path = self.descriptor().object_path(&id);
        session
            .call(Step::Write, self.transport.patch(&path, &prepared.body))
            .await
            .map_err(|e| session.fail(e))?;
        log::info!("Updated {} {}", kind, id);

        if let Some(assignments) = &prepared.assignments {
            session.advance(Phase::AssigningSubResources);
            if let Some(Field::Concrete(prior_specs)) = prior.assignments() {
                match resolve(prior_specs) {
                    Ok(current) => {
                        let changes = diff(assignments, &current);
                        log::debug!(
                            "{} {} assignments: {} to add, {} to remove",
                            kind,
                            id,
                            changes.missing.len(),
                            changes.unexpected.len()
                        );
                    }
                    Err(e) => log::warn!(
                        "Tracked assignments of {} {} are invalid ({}); replacing them as a whole",
                        kind,
                        id,
                        e
                    ),
                }
            }
            if let Err(e) = self.assign(&session, &id, assignments).await {
                log::warn!(
                    "{} {} was updated but its assignments were not applied",
                    kind,
                    id
                );
                return Err(session.fail(e));
            }
        }

        let state = self
            .read_back(&mut session, &id, &planned)
            .await
            .map_err(|e| session.fail(e))?;
        session.advance(Phase::Converged);
        Ok(state)
    }

    async fn run_lookup(&self, filter: &LookupFilter) -> Result<Vec<M::Desired>, OperationError> {
        let kind = self.kind();
        let descriptor = self.descriptor();
        let mut session = self.session(Operation::Read);
        let empty = M::Desired::default();

        session.advance(Phase::ReadingBack);
        let found = match filter {
            LookupFilter::Id(id) => {
                let body = session
                    .call(Step::Read, self.transport.get(&descriptor.object_path(id)))
                    .await
                    .map_err(|e| session.fail(e))?;
                let object = self
                    .decode(body, Step::Read, Some(id), &empty)
                    .map_err(|e| session.fail(e))?;
                vec![object]
            }
            LookupFilter::All | LookupFilter::DisplayName(_) => {
                let listing = session
                    .call(Step::Read, self.transport.get(descriptor.collection_path))
                    .await
                    .map_err(|e| session.fail(e))?;
                let items = listing_items(&listing, kind)
                    .map_err(|e| session.fail(diagnose(&e, Step::Read, kind, &[])))?;

                let mut found = Vec::new();
                for item in items {
                    let object = self
                        .decode(item.clone(), Step::Read, None, &empty)
                        .map_err(|e| session.fail(e))?;
                    if filter.matches(&object) {
                        found.push(object);
                    }
                }
                found
            }
        };

        log::debug!("Lookup of {} ({}) found {} object(s)", kind, filter, found.len());
        session.advance(Phase::Converged);
        Ok(found)
    }

    async fn run_delete(&self, state: &M::Desired) -> Result<(), OperationError> {
        let kind = self.kind();
        let mut session = self.session(Operation::Delete);
        let id = tracked_id(kind, state, None).map_err(|e| session.fail(e))?;

        session.advance(Phase::Writing);
        let path = self.descriptor().object_path(&id);
        match session.call(Step::Delete, self.transport.delete(&path)).await {
            Ok(()) => log::info!("Deleted {} {}", kind, id),
            Err(e) if e.kind == ErrorKind::NotFound => {
                log::info!("{} {} was already deleted", kind, id);
            }
            Err(e) => return Err(session.fail(e)),
        }

        session.advance(Phase::Converged);
        Ok(())
    }

    /// Builds the request body and resolves the assignment set. Pure.
    fn prepare(
        &self,
        planned: &M::Desired,
        update: bool,
        prior: Option<&M::Desired>,
    ) -> Result<Prepared, OperationError> {
        let descriptor = self.descriptor();
        let invalid = |err: ValidationError| OperationError::validation(descriptor.name, err);

        let wire = if update {
            self.mapper.construct_update(planned)
        } else {
            self.mapper.construct(planned)
        }
        .map_err(invalid)?;

        let body = serde_json::to_value(&wire)
            .map_err(|e| invalid(ValidationError::new("", e.to_string())))?;
        log::debug!(
            "{} request body: {}",
            descriptor.name,
            redact(&body, descriptor.sensitive_fields)
        );

        let assignments = match planned.assignments() {
            None | Some(Field::Absent) => None,
            Some(Field::Unknown) => {
                return Err(invalid(ValidationError::new("assignments", "value is not known yet")))
            }
            Some(Field::Concrete(specs)) => {
                if descriptor.assignments.is_none() {
                    return Err(invalid(ValidationError::new(
                        "assignments",
                        format!("{} does not support assignments", descriptor.name),
                    )));
                }
                let mut resolved = resolve(specs).map_err(invalid)?;
                if let Some(Field::Concrete(prior_specs)) = prior.and_then(|p| p.assignments()) {
                    let carried = carry_unrecognized(&resolved, prior_specs);
                    if !carried.is_empty() {
                        log::debug!(
                            "Keeping {} unrecognized assignment(s) on {}",
                            carried.len(),
                            descriptor.name
                        );
                    }
                    resolved.extend(carried);
                }
                Some(resolved)
            }
        };

        Ok(Prepared { body, assignments })
    }

    async fn assign(
        &self,
        session: &ConvergenceSession,
        id: &str,
        assignments: &[Assignment],
    ) -> Result<(), OperationError> {
        let descriptor = self.descriptor();
        let Some(sub_resource) = &descriptor.assignments else {
            return Ok(());
        };

        let reconciler = AssignmentReconciler::new(
            &self.transport,
            descriptor.object_path(id),
            sub_resource.body_key,
        );
        session.call(Step::Assign, reconciler.replace(assignments)).await
    }

    /// Reads the object and its assignments. `Ok(None)` when either is gone.
    async fn fetch(
        &self,
        session: &ConvergenceSession,
        step: Step,
        id: &str,
        prior: &M::Desired,
    ) -> Result<Option<M::Desired>, OperationError> {
        let descriptor = self.descriptor();
        let path = descriptor.object_path(id);

        let body = match session.call(step, self.transport.get(&path)).await {
            Ok(body) => body,
            Err(e) if e.kind == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut state = self.decode(body, step, Some(id), prior)?;

        if let Some(sub_resource) = &descriptor.assignments {
            let reconciler = AssignmentReconciler::new(&self.transport, path, sub_resource.body_key);
            match session.call(step, reconciler.list()).await {
                Ok(remote) => state.set_assignments(remote.iter().map(AssignmentSpec::from).collect()),
                Err(e) if e.kind == ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e),
            }
        }

        Ok(Some(state))
    }

    /// Projects one wire object into state. `id` fills in an id the body
    /// left out.
    fn decode(
        &self,
        body: Value,
        step: Step,
        id: Option<&str>,
        prior: &M::Desired,
    ) -> Result<M::Desired, OperationError> {
        let name = self.kind();
        let wire: M::Wire = serde_json::from_value(body)
            .map_err(|e| OperationError::new(step, ErrorKind::Malformed, name, e.to_string()))?;
        let mut state = self.mapper.project(wire, prior).map_err(|e| OperationError {
            field_path: Some(e.path.clone()),
            ..OperationError::new(step, ErrorKind::Malformed, name, e.message)
        })?;
        if let Some(id) = id {
            if !state.id().is_concrete() {
                state.set_id(Field::Concrete(id.to_string()));
            }
        }
        Ok(state)
    }

    /// Reads the object back after a write until it is visible.
    ///
    /// Not-found, throttled and transient failures are retried with linear
    /// spacing, stretched to any `Retry-After` the service sent; every other
    /// failure ends the read-back at once.
    async fn read_back(
        &self,
        session: &mut ConvergenceSession,
        id: &str,
        prior: &M::Desired,
    ) -> Result<M::Desired, OperationError> {
        let kind = self.kind();
        session.advance(Phase::ReadingBack);

        let policy = session.read_back();
        let attempts = policy.attempts.max(1);
        let mut last_error: Option<OperationError> = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                // The service's Retry-After wins when it asks for longer.
                let requested = last_error.as_ref().and_then(|e| e.retry_after);
                let delay = policy.delay_before(attempt).max(requested.unwrap_or_default());
                log::warn!(
                    "Retrying read-back of {} {} (attempt {}/{}) after {:?}",
                    kind,
                    id,
                    attempt,
                    attempts,
                    delay
                );
                session.pause(Step::ReadBack, delay).await?;
            }
            if session.is_expired() {
                return Err(session.timeout_error(Step::ReadBack));
            }

            match self.fetch(session, Step::ReadBack, id, prior).await {
                Ok(Some(state)) => return Ok(state),
                Ok(None) => {
                    log::debug!("{} {} not visible yet", kind, id);
                    last_error = Some(OperationError::new(
                        Step::ReadBack,
                        ErrorKind::NotFound,
                        kind,
                        format!("{} was not visible after the write", id),
                    ));
                }
                Err(e) if e.kind.is_retryable() => {
                    log::warn!("Read-back of {} {} failed with retryable error: {}", kind, id, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let err = last_error.unwrap_or_else(|| session.timeout_error(Step::ReadBack));
        Err(OperationError {
            message: format!("{} (gave up after {} read-back attempts)", err.message, attempts),
            ..err
        })
    }
}

/// Id of the tracked object, taken from `state` or else from `fallback`.
fn tracked_id<D: DesiredObject>(
    kind: &str,
    state: &D,
    fallback: Option<&D>,
) -> Result<String, OperationError> {
    state
        .id()
        .as_concrete()
        .or_else(|| fallback.and_then(|d| d.id().as_concrete()))
        .cloned()
        .ok_or_else(|| {
            OperationError::validation(kind, ValidationError::new("id", "tracked state has no id"))
        })
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::{Arc, Mutex};

    use tracing::field::{Field as TraceField, Visit};
    use tracing::span::{Attributes, Id, Record};
    use tracing::Subscriber;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::{Layer, Registry};

    use super::*;
    use crate::client::FakeService;
    use crate::kinds::{PlatformScript, PlatformScriptMapper};

    /// Collects every non-empty `object_id` a span is given.
    #[derive(Clone, Default)]
    struct ObjectIds(Arc<Mutex<Vec<String>>>);

    struct ObjectIdVisitor<'a>(&'a mut Vec<String>);

    impl Visit for ObjectIdVisitor<'_> {
        fn record_str(&mut self, field: &TraceField, value: &str) {
            if field.name() == "object_id" && !value.is_empty() {
                self.0.push(value.to_string());
            }
        }

        fn record_debug(&mut self, _field: &TraceField, _value: &dyn fmt::Debug) {}
    }

    impl<S: Subscriber> Layer<S> for ObjectIds {
        fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
            attrs.record(&mut ObjectIdVisitor(&mut self.0.lock().unwrap()));
        }

        fn on_record(&self, _id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
            values.record(&mut ObjectIdVisitor(&mut self.0.lock().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_create_span_records_object_id() {
        let ids = ObjectIds::default();
        let _guard = tracing::subscriber::set_default(Registry::default().with(ids.clone()));

        let controller = Controller::new(PlatformScriptMapper::new(), FakeService::new());
        let desired = PlatformScript {
            display_name: "Script A".into(),
            script_content: "Write-Host 'hello'".into(),
            file_name: "hello.ps1".into(),
            ..PlatformScript::default()
        };

        let state = controller.create(&desired).await.unwrap();

        let id = state.id.as_str().unwrap().to_string();
        assert_eq!(*ids.0.lock().unwrap(), vec![id]);
    }
}
