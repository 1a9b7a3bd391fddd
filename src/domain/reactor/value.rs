//! Reactors that produce plain values.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::rc::Rc;

use tracing::debug;

use crate::domain::canvas_type::CanvasType;
use crate::domain::error::ReactorError;
use crate::domain::function::FunctionOp;
use crate::domain::node::ReadErrorPolicy;
use crate::domain::order::Security;
use crate::domain::reactor::{Reactor, ReactorHandle, Update};
use crate::domain::value::Value;
use crate::ports::market_data_port::MarketDataPort;

/// Emits a single value, then completes.
pub struct ConstantReactor {
    value: Value,
}

impl ConstantReactor {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl Reactor for ConstantReactor {
    fn commit(&mut self, _sequence: u64) -> Result<Update, ReactorError> {
        Ok(Update::CompleteEvaluated)
    }

    fn value(&self) -> Option<Value> {
        Some(self.value.clone())
    }
}

/// Completes without ever producing a value.
pub struct NoneReactor;

impl Reactor for NoneReactor {
    fn commit(&mut self, _sequence: u64) -> Result<Update, ReactorError> {
        Ok(Update::Complete)
    }

    fn value(&self) -> Option<Value> {
        None
    }
}

/// Emits a value captured at construction, if there is one.
pub struct StaticReactor {
    value: Option<Value>,
}

impl StaticReactor {
    pub fn new(value: Option<Value>) -> Self {
        Self { value }
    }
}

impl Reactor for StaticReactor {
    fn commit(&mut self, _sequence: u64) -> Result<Update, ReactorError> {
        Ok(Update::new(self.value.is_some(), true))
    }

    fn value(&self) -> Option<Value> {
        self.value.clone()
    }
}

/// Commits its source until the first value arrives, then keeps that value.
pub struct FirstValueReactor {
    source: ReactorHandle,
    value: Option<Value>,
}

impl FirstValueReactor {
    pub fn new(source: ReactorHandle) -> Self {
        Self { source, value: None }
    }
}

impl Reactor for FirstValueReactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        let update = self.source.commit(sequence)?;
        if update.has_evaluation() {
            self.value = self.source.value();
            return Ok(Update::new(self.value.is_some(), true));
        }
        Ok(Update::new(false, update.is_complete()))
    }

    fn value(&self) -> Option<Value> {
        self.value.clone()
    }
}

/// Lets a source value through when the condition is true at the time the
/// value is pending. A value held back while the condition is false passes
/// once the condition turns true.
pub struct FilterReactor {
    condition: ReactorHandle,
    source: ReactorHandle,
    passed: u64,
    value: Option<Value>,
}

impl FilterReactor {
    pub fn new(condition: ReactorHandle, source: ReactorHandle) -> Self {
        Self {
            condition,
            source,
            passed: 0,
            value: None,
        }
    }
}

impl Reactor for FilterReactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        let condition = self.condition.commit(sequence)?;
        let source = self.source.commit(sequence)?;
        let open = matches!(self.condition.value(), Some(Value::Boolean(true)));
        let mut evaluated = false;
        if open && self.source.version() > self.passed {
            if let Some(value) = self.source.value() {
                self.value = Some(value);
                evaluated = true;
            }
            self.passed = self.source.version();
        }
        let drained = source.is_complete() && self.source.version() == self.passed;
        let shut = condition.is_complete() && !open;
        Ok(Update::new(evaluated, drained || shut))
    }

    fn value(&self) -> Option<Value> {
        self.value.clone()
    }
}

/// Follows a reactor that somebody else commits, reporting a new evaluation
/// whenever the source's version moves.
pub struct MirrorReactor {
    source: ReactorHandle,
    seen: u64,
}

impl MirrorReactor {
    pub fn new(source: ReactorHandle) -> Self {
        Self { source, seen: 0 }
    }
}

impl Reactor for MirrorReactor {
    fn commit(&mut self, _sequence: u64) -> Result<Update, ReactorError> {
        let version = self.source.version();
        let evaluated = version > self.seen;
        self.seen = version;
        Ok(Update::new(evaluated, self.source.is_complete()))
    }

    fn value(&self) -> Option<Value> {
        self.source.value()
    }
}

/// Commits every input and reports whether any of them evaluated and whether
/// all of them are complete.
pub(crate) fn commit_all(inputs: &[ReactorHandle], sequence: u64) -> Result<(bool, bool), ReactorError> {
    let mut evaluated = false;
    let mut complete = true;
    for input in inputs {
        let update = input.commit(sequence)?;
        evaluated |= update.has_evaluation();
        complete &= update.is_complete();
    }
    Ok((evaluated, complete))
}

pub(crate) fn input_values(inputs: &[ReactorHandle]) -> Option<Vec<Value>> {
    inputs.iter().map(ReactorHandle::value).collect()
}

/// Re-applies a function whenever an argument changes and every argument has
/// a value.
pub struct FunctionReactor {
    op: FunctionOp,
    arguments: Vec<ReactorHandle>,
    value: Option<Value>,
}

impl FunctionReactor {
    pub fn new(op: FunctionOp, arguments: Vec<ReactorHandle>) -> Self {
        Self {
            op,
            arguments,
            value: None,
        }
    }
}

impl Reactor for FunctionReactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        let (changed, complete) = commit_all(&self.arguments, sequence)?;
        let mut evaluated = false;
        if changed {
            if let Some(values) = input_values(&self.arguments) {
                self.value = Some(self.op.apply(&values)?);
                evaluated = true;
            }
        }
        Ok(Update::new(evaluated, complete))
    }

    fn value(&self) -> Option<Value> {
        self.value.clone()
    }
}

/// Assembles a record from its field reactors.
pub struct RecordReactor {
    fields: Vec<ReactorHandle>,
    value: Option<Value>,
}

impl RecordReactor {
    pub fn new(fields: Vec<ReactorHandle>) -> Self {
        Self {
            fields,
            value: None,
        }
    }
}

impl Reactor for RecordReactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        let (changed, complete) = commit_all(&self.fields, sequence)?;
        let mut evaluated = false;
        if changed {
            if let Some(values) = input_values(&self.fields) {
                self.value = Some(Value::Record(values));
                evaluated = true;
            }
        }
        Ok(Update::new(evaluated, complete))
    }

    fn value(&self) -> Option<Value> {
        self.value.clone()
    }
}

/// Projects one field out of a record.
pub struct QueryReactor {
    record: ReactorHandle,
    index: usize,
    value: Option<Value>,
}

impl QueryReactor {
    pub fn new(record: ReactorHandle, index: usize) -> Self {
        Self {
            record,
            index,
            value: None,
        }
    }
}

impl Reactor for QueryReactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        let update = self.record.commit(sequence)?;
        let mut evaluated = false;
        if update.has_evaluation() {
            match self.record.value() {
                Some(Value::Record(fields)) => {
                    let field = fields.get(self.index).cloned().ok_or_else(|| {
                        ReactorError::TypeMismatch {
                            expected: format!("record with field {}", self.index),
                            found: format!("record with {} fields", fields.len()),
                        }
                    })?;
                    self.value = Some(field);
                    evaluated = true;
                }
                Some(other) => {
                    return Err(ReactorError::TypeMismatch {
                        expected: "record".to_string(),
                        found: other.to_string(),
                    });
                }
                None => {}
            }
        }
        Ok(Update::new(evaluated, update.is_complete()))
    }

    fn value(&self) -> Option<Value> {
        self.value.clone()
    }
}

/// Runs its elements one after another and carries the value of whichever
/// element is current. An element that completes with an evaluation hands
/// over on the next tick, so its value is observed before the next element
/// takes over.
pub struct ChainReactor {
    elements: Vec<ReactorHandle>,
    index: usize,
    entering: bool,
    value: Option<Value>,
}

impl ChainReactor {
    pub fn new(elements: Vec<ReactorHandle>) -> Self {
        Self {
            elements,
            index: 0,
            entering: true,
            value: None,
        }
    }
}

impl Reactor for ChainReactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        loop {
            let Some(current) = self.elements.get(self.index) else {
                return Ok(Update::Complete);
            };
            let update = current.commit(sequence)?;
            // An element shared with an earlier part of the graph may already
            // hold its value by the time the chain reaches it.
            let evaluated = update.has_evaluation() || (self.entering && current.value().is_some());
            self.entering = false;
            if evaluated {
                self.value = current.value();
            }
            if !update.is_complete() {
                return Ok(Update::new(evaluated, false));
            }
            if self.index + 1 == self.elements.len() {
                return Ok(Update::new(evaluated, true));
            }
            self.index += 1;
            self.entering = true;
            if evaluated {
                return Ok(Update::Evaluated);
            }
        }
    }

    fn value(&self) -> Option<Value> {
        self.value.clone()
    }
}

/// A value slot written by a fold and read by its combiner.
#[derive(Clone, Default)]
pub struct FoldSlot {
    value: Rc<RefCell<Option<Value>>>,
    generation: Rc<Cell<u64>>,
}

impl FoldSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, value: Value) {
        *self.value.borrow_mut() = Some(value);
        self.generation.set(self.generation.get() + 1);
    }
}

/// Stands in for one of a fold combiner's parameters.
pub struct FoldParameterReactor {
    slot: FoldSlot,
    seen: u64,
}

impl FoldParameterReactor {
    pub fn new(slot: FoldSlot) -> Self {
        Self { slot, seen: 0 }
    }
}

impl Reactor for FoldParameterReactor {
    fn commit(&mut self, _sequence: u64) -> Result<Update, ReactorError> {
        let generation = self.slot.generation.get();
        let evaluated = generation > self.seen;
        self.seen = generation;
        Ok(Update::new(evaluated, false))
    }

    fn value(&self) -> Option<Value> {
        self.slot.value.borrow().clone()
    }
}

/// Accumulates source values through a combiner expression.
///
/// The first source value seeds the accumulator when it already has the
/// fold's type; otherwise it is combined with the type's default value.
pub struct FoldReactor {
    fold_type: CanvasType,
    combiner: ReactorHandle,
    source: ReactorHandle,
    left: FoldSlot,
    right: FoldSlot,
    value: Option<Value>,
}

impl FoldReactor {
    pub fn new(
        fold_type: CanvasType,
        combiner: ReactorHandle,
        source: ReactorHandle,
        left: FoldSlot,
        right: FoldSlot,
    ) -> Self {
        Self {
            fold_type,
            combiner,
            source,
            left,
            right,
            value: None,
        }
    }

    fn combine(&mut self, accumulator: Value, element: Value, sequence: u64) -> Result<bool, ReactorError> {
        self.left.set(accumulator.clone());
        self.right.set(element);
        let update = self.combiner.commit(sequence)?;
        self.value = if update.has_evaluation() {
            self.combiner.value()
        } else {
            Some(accumulator)
        };
        Ok(update.has_evaluation())
    }
}

impl Reactor for FoldReactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        let update = self.source.commit(sequence)?;
        let mut evaluated = false;
        if update.has_evaluation() {
            if let Some(element) = self.source.value() {
                match self.value.take() {
                    Some(accumulator) => evaluated = self.combine(accumulator, element, sequence)?,
                    None if element.matches_type(&self.fold_type) => {
                        self.value = Some(element);
                        evaluated = true;
                    }
                    None => {
                        let seed = Value::default_for(&self.fold_type).ok_or_else(|| {
                            ReactorError::TypeMismatch {
                                expected: self.fold_type.to_string(),
                                found: element.to_string(),
                            }
                        })?;
                        evaluated = self.combine(seed, element, sequence)?;
                    }
                }
            }
        }
        Ok(Update::new(evaluated, update.is_complete()))
    }

    fn value(&self) -> Option<Value> {
        self.value.clone()
    }
}

/// Reads the first column of a CSV file, one line per tick.
pub struct FileReaderReactor {
    path: ReactorHandle,
    read_type: CanvasType,
    policy: ReadErrorPolicy,
    lines: VecDeque<Value>,
    value: Option<Value>,
}

impl FileReaderReactor {
    pub fn new(path: ReactorHandle, read_type: CanvasType, policy: ReadErrorPolicy) -> Self {
        Self {
            path,
            read_type,
            policy,
            lines: VecDeque::new(),
            value: None,
        }
    }

    fn load(&mut self, path: &str) -> Result<(), ReactorError> {
        let content = fs::read_to_string(path).map_err(|e| ReactorError::File {
            reason: format!("failed to read {path}: {e}"),
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());
        self.lines.clear();
        for (line, record) in reader.records().enumerate() {
            let parsed = record
                .map_err(|e| e.to_string())
                .and_then(|r| {
                    let field = r.get(0).unwrap_or_default().to_string();
                    Value::parse(&self.read_type, &field)
                });
            match (parsed, self.policy) {
                (Ok(value), _) => self.lines.push_back(value),
                (Err(_), ReadErrorPolicy::Skip) => {}
                (Err(_), ReadErrorPolicy::Stop) => break,
                (Err(reason), ReadErrorPolicy::Fail) => {
                    return Err(ReactorError::File {
                        reason: format!("{path}:{}: {reason}", line + 1),
                    });
                }
            }
        }
        debug!(path, lines = self.lines.len(), "loaded file");
        Ok(())
    }
}

impl Reactor for FileReaderReactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        let update = self.path.commit(sequence)?;
        if update.has_evaluation() {
            match self.path.value() {
                Some(Value::Text(path)) => self.load(&path)?,
                Some(other) => {
                    return Err(ReactorError::TypeMismatch {
                        expected: CanvasType::Text.to_string(),
                        found: other.to_string(),
                    });
                }
                None => {}
            }
        }
        let next = self.lines.pop_front();
        let evaluated = next.is_some();
        if next.is_some() {
            self.value = next;
        }
        Ok(Update::new(
            evaluated,
            update.is_complete() && self.lines.is_empty(),
        ))
    }

    fn value(&self) -> Option<Value> {
        self.value.clone()
    }
}

/// Replays the time and sales of a security, one print per tick.
pub struct TimeAndSalesReactor {
    security: ReactorHandle,
    market_data: Option<Rc<dyn MarketDataPort>>,
    prints: VecDeque<Value>,
    value: Option<Value>,
}

impl TimeAndSalesReactor {
    pub fn new(security: ReactorHandle, market_data: Option<Rc<dyn MarketDataPort>>) -> Self {
        Self {
            security,
            market_data,
            prints: VecDeque::new(),
            value: None,
        }
    }

    fn load(&mut self, security: &Security) -> Result<(), ReactorError> {
        let port = self.market_data.as_ref().ok_or_else(|| ReactorError::MarketData {
            reason: "no market data service available".to_string(),
        })?;
        let prints = port
            .load_time_and_sales(security)
            .map_err(|e| ReactorError::MarketData {
                reason: e.to_string(),
            })?;
        self.prints = prints.iter().map(|p| p.to_value()).collect();
        debug!(%security, prints = self.prints.len(), "loaded time and sales");
        Ok(())
    }
}

impl Reactor for TimeAndSalesReactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        let update = self.security.commit(sequence)?;
        if update.has_evaluation() {
            match self.security.value() {
                Some(Value::Security(security)) => self.load(&security)?,
                Some(other) => {
                    return Err(ReactorError::TypeMismatch {
                        expected: CanvasType::Security.to_string(),
                        found: other.to_string(),
                    });
                }
                None => {}
            }
        }
        let next = self.prints.pop_front();
        let evaluated = next.is_some();
        if next.is_some() {
            self.value = next;
        }
        Ok(Update::new(
            evaluated,
            update.is_complete() && self.prints.is_empty(),
        ))
    }

    fn value(&self) -> Option<Value> {
        self.value.clone()
    }
}

/// Passes values of the expected type to a callback.
pub struct CallbackReactor {
    source: ReactorHandle,
    expected: CanvasType,
    callback: Box<dyn FnMut(&Value)>,
}

impl CallbackReactor {
    pub fn new(source: ReactorHandle, expected: CanvasType, callback: Box<dyn FnMut(&Value)>) -> Self {
        Self {
            source,
            expected,
            callback,
        }
    }
}

impl Reactor for CallbackReactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        let update = self.source.commit(sequence)?;
        if update.has_evaluation() {
            if let Some(value) = self.source.value() {
                if !value.matches_type(&self.expected) {
                    return Err(ReactorError::TypeMismatch {
                        expected: self.expected.to_string(),
                        found: value.to_string(),
                    });
                }
                (self.callback)(&value);
            }
        }
        Ok(update)
    }

    fn value(&self) -> Option<Value> {
        self.source.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::CanvasError;
    use crate::domain::order::TimeAndSale;
    use chrono::NaiveDate;
    use std::io::Write;

    fn constant(value: i64) -> ReactorHandle {
        ReactorHandle::new(ConstantReactor::new(Value::Integer(value)))
    }

    fn drive(handle: &ReactorHandle, ticks: u64) -> Vec<(Update, Option<Value>)> {
        (1..=ticks)
            .map(|seq| {
                let update = handle.commit(seq).unwrap();
                (update, handle.value())
            })
            .collect()
    }

    /// Emits each value on its own tick.
    struct Sequence(VecDeque<Value>, Option<Value>);

    impl Reactor for Sequence {
        fn commit(&mut self, _sequence: u64) -> Result<Update, ReactorError> {
            self.1 = self.0.pop_front();
            Ok(Update::new(self.1.is_some(), self.0.is_empty()))
        }

        fn value(&self) -> Option<Value> {
            self.1.clone()
        }
    }

    fn sequence(values: &[i64]) -> ReactorHandle {
        ReactorHandle::new(Sequence(
            values.iter().map(|v| Value::Integer(*v)).collect(),
            None,
        ))
    }

    #[test]
    fn chain_emits_each_element_in_turn() {
        let chain = ReactorHandle::new(ChainReactor::new(vec![constant(123), constant(456)]));
        let ticks = drive(&chain, 2);
        assert_eq!(ticks[0], (Update::Evaluated, Some(Value::Integer(123))));
        assert_eq!(ticks[1], (Update::CompleteEvaluated, Some(Value::Integer(456))));
    }

    #[test]
    fn chain_reuses_value_of_shared_element() {
        let shared = constant(123);
        let chain = ReactorHandle::new(ChainReactor::new(vec![shared.clone(), shared]));
        let ticks = drive(&chain, 2);
        assert_eq!(ticks[0], (Update::Evaluated, Some(Value::Integer(123))));
        assert_eq!(ticks[1], (Update::CompleteEvaluated, Some(Value::Integer(123))));
    }

    #[test]
    fn chain_skips_elements_without_values() {
        let chain = ReactorHandle::new(ChainReactor::new(vec![
            ReactorHandle::new(NoneReactor),
            constant(7),
        ]));
        assert_eq!(chain.commit(1).unwrap(), Update::CompleteEvaluated);
        assert_eq!(chain.value(), Some(Value::Integer(7)));
    }

    fn flags(values: &[bool]) -> ReactorHandle {
        ReactorHandle::new(Sequence(
            values.iter().map(|v| Value::Boolean(*v)).collect(),
            None,
        ))
    }

    #[test]
    fn first_value_is_held() {
        let held = ReactorHandle::new(FirstValueReactor::new(sequence(&[4, 5])));
        let ticks = drive(&held, 2);
        assert_eq!(ticks[0], (Update::CompleteEvaluated, Some(Value::Integer(4))));
        assert_eq!(ticks[1], (Update::Complete, Some(Value::Integer(4))));

        let empty = ReactorHandle::new(FirstValueReactor::new(ReactorHandle::new(NoneReactor)));
        assert_eq!(empty.commit(1).unwrap(), Update::Complete);
        assert_eq!(empty.value(), None);
    }

    #[test]
    fn filter_passes_values_while_open() {
        let filter = ReactorHandle::new(FilterReactor::new(flags(&[false, true, true]), sequence(&[1, 2, 3])));
        let ticks = drive(&filter, 3);
        assert_eq!(ticks[0], (Update::Continue, None));
        assert_eq!(ticks[1], (Update::Evaluated, Some(Value::Integer(2))));
        assert_eq!(ticks[2], (Update::CompleteEvaluated, Some(Value::Integer(3))));
    }

    #[test]
    fn filter_releases_a_held_value_when_it_opens() {
        let filter = ReactorHandle::new(FilterReactor::new(flags(&[false, false, true]), constant(5)));
        let ticks = drive(&filter, 3);
        assert_eq!(ticks[1], (Update::Continue, None));
        assert_eq!(ticks[2], (Update::CompleteEvaluated, Some(Value::Integer(5))));
    }

    #[test]
    fn closed_filter_completes_empty() {
        let closed = ReactorHandle::new(ConstantReactor::new(Value::Boolean(false)));
        let filter = ReactorHandle::new(FilterReactor::new(closed, sequence(&[1, 2])));
        assert_eq!(filter.commit(1).unwrap(), Update::Complete);
        assert_eq!(filter.value(), None);
    }

    #[test]
    fn function_waits_for_all_arguments() {
        let left = sequence(&[1, 2, 3]);
        let function = ReactorHandle::new(FunctionReactor::new(
            FunctionOp::Addition,
            vec![left, ReactorHandle::new(NoneReactor)],
        ));
        assert_eq!(function.commit(1).unwrap(), Update::Continue);
        assert_eq!(function.value(), None);

        let function = ReactorHandle::new(FunctionReactor::new(
            FunctionOp::Addition,
            vec![sequence(&[1, 2]), constant(10)],
        ));
        let ticks = drive(&function, 2);
        assert_eq!(ticks[0], (Update::Evaluated, Some(Value::Integer(11))));
        assert_eq!(ticks[1], (Update::CompleteEvaluated, Some(Value::Integer(12))));
    }

    #[test]
    fn fold_accumulates_source() {
        let left = FoldSlot::new();
        let right = FoldSlot::new();
        let combiner = ReactorHandle::new(FunctionReactor::new(
            FunctionOp::Addition,
            vec![
                ReactorHandle::new(FoldParameterReactor::new(left.clone())),
                ReactorHandle::new(FoldParameterReactor::new(right.clone())),
            ],
        ));
        let fold = ReactorHandle::new(FoldReactor::new(
            CanvasType::Integer,
            combiner,
            sequence(&[1, 2, 3, 4]),
            left,
            right,
        ));
        let values: Vec<Option<Value>> = drive(&fold, 4).into_iter().map(|(_, v)| v).collect();
        assert_eq!(
            values,
            [1, 3, 6, 10].map(|v| Some(Value::Integer(v)))
        );
        assert!(fold.is_complete());
    }

    #[test]
    fn query_projects_record_field() {
        let record = ReactorHandle::new(RecordReactor::new(vec![constant(1), constant(2)]));
        let query = ReactorHandle::new(QueryReactor::new(record, 1));
        assert_eq!(query.commit(1).unwrap(), Update::CompleteEvaluated);
        assert_eq!(query.value(), Some(Value::Integer(2)));
    }

    #[test]
    fn mirror_follows_without_committing() {
        let source = sequence(&[5, 6]);
        let mirror = ReactorHandle::new(MirrorReactor::new(source.clone()));
        assert_eq!(mirror.commit(1).unwrap(), Update::Continue);
        source.commit(2).unwrap();
        assert_eq!(mirror.commit(2).unwrap(), Update::Evaluated);
        assert_eq!(mirror.value(), Some(Value::Integer(5)));
        source.commit(3).unwrap();
        assert_eq!(mirror.commit(3).unwrap(), Update::CompleteEvaluated);
    }

    fn reader_over(contents: &str, policy: ReadErrorPolicy) -> (tempfile::NamedTempFile, ReactorHandle) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        let path = file.path().to_string_lossy().to_string();
        let reader = ReactorHandle::new(FileReaderReactor::new(
            ReactorHandle::new(ConstantReactor::new(Value::Text(path))),
            CanvasType::Integer,
            policy,
        ));
        (file, reader)
    }

    #[test]
    fn file_reader_applies_error_policy() {
        let (_file, skip) = reader_over("1\nx\n3,ignored\n", ReadErrorPolicy::Skip);
        let values: Vec<Option<Value>> = drive(&skip, 2).into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, [Some(Value::Integer(1)), Some(Value::Integer(3))]);
        assert!(skip.is_complete());

        let (_file, stop) = reader_over("1\nx\n3\n", ReadErrorPolicy::Stop);
        assert_eq!(stop.commit(1).unwrap(), Update::CompleteEvaluated);

        let (_file, fail) = reader_over("1\nx\n", ReadErrorPolicy::Fail);
        assert!(matches!(fail.commit(1), Err(ReactorError::File { .. })));
    }

    struct OnePrint;

    impl MarketDataPort for OnePrint {
        fn load_time_and_sales(&self, _security: &Security) -> Result<Vec<TimeAndSale>, CanvasError> {
            Ok(vec![TimeAndSale {
                timestamp: NaiveDate::from_ymd_opt(2024, 1, 2)
                    .unwrap()
                    .and_hms_opt(10, 0, 0)
                    .unwrap(),
                price: 4.5,
                size: 300,
                market_center: "ASX".to_string(),
            }])
        }
    }

    #[test]
    fn time_and_sales_replays_prints() {
        let security = ReactorHandle::new(ConstantReactor::new(Value::Security(Security::new("BHP", "ASX"))));
        let prints = ReactorHandle::new(TimeAndSalesReactor::new(security, Some(Rc::new(OnePrint))));
        assert_eq!(prints.commit(1).unwrap(), Update::CompleteEvaluated);
        let Some(Value::Record(fields)) = prints.value() else {
            panic!("expected a record");
        };
        assert_eq!(fields[2], Value::Integer(300));
    }

    #[test]
    fn callback_checks_type() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let callback = ReactorHandle::new(CallbackReactor::new(
            constant(3),
            CanvasType::Integer,
            Box::new(move |v| sink.borrow_mut().push(v.clone())),
        ));
        callback.commit(1).unwrap();
        assert_eq!(*seen.borrow(), [Value::Integer(3)]);

        let mismatched = ReactorHandle::new(CallbackReactor::new(
            constant(3),
            CanvasType::Text,
            Box::new(|_| {}),
        ));
        assert!(matches!(mismatched.commit(1), Err(ReactorError::TypeMismatch { .. })));
    }
}
