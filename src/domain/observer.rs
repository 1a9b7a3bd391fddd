//! Secondary expressions evaluated alongside a running task.
//!
//! The observer expression lives next to a copy of the task's tree inside a
//! two-slot wrapper, so its references can name the task as `target` and
//! nodes inside it as `target/...`. It is
//! translated only once every node it depends on has been translated by the
//! task, and from then on reads their values without committing them.

use std::rc::Rc;

use tracing::{debug, warn};

use crate::domain::error::CanvasError;
use crate::domain::node::{CanvasNode, Slot};
use crate::domain::node_ref::NodeRef;
use crate::domain::path::CanvasPath;
use crate::domain::reactor::value::{CallbackReactor, MirrorReactor};
use crate::domain::reactor::ReactorHandle;
use crate::domain::reference::{find_referent, referent_string};
use crate::domain::task::Task;
use crate::domain::translator::{translate, Translation, TranslationContext};
use crate::domain::validator::validate;
use crate::domain::value::Value;

const TARGET: &str = "target";
const OBSERVER: &str = "observer";

pub type ObserverCallback = Box<dyn FnMut(&Value)>;

/// A node of the task that the observer reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Where the dependency sits inside the wrapper.
    pub wrapper_path: CanvasPath,
    /// Where the same node sits inside the task.
    pub task_path: CanvasPath,
}

pub struct CanvasObserver {
    task: Rc<Task>,
    wrapper: Rc<CanvasNode>,
    valid: bool,
    dependencies: Vec<Dependency>,
    callback: Option<ObserverCallback>,
    reactor: Option<ReactorHandle>,
}

impl CanvasObserver {
    pub fn new(task: Rc<Task>, observer: CanvasNode, callback: impl FnMut(&Value) + 'static) -> Self {
        let target = task.node().clone();
        let wrapper = CanvasNode::custom(
            "Observer",
            observer.canvas_type().clone(),
            vec![
                (Slot::new(TARGET, target.canvas_type().clone()), target),
                (Slot::new(OBSERVER, observer.canvas_type().clone()), observer),
            ],
        );
        let errors = validate(&wrapper);
        for error in &errors {
            debug!(%error, "observer is invalid");
        }
        let valid = errors.is_empty();
        let dependencies = if valid { find_dependencies(&wrapper) } else { Vec::new() };
        Self {
            task,
            wrapper: Rc::new(wrapper),
            valid,
            dependencies,
            callback: Some(Box::new(callback)),
            reactor: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_translated(&self) -> bool {
        self.reactor.is_some()
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// The observer's current value, once translated.
    pub fn value(&self) -> Option<Value> {
        self.reactor.as_ref().and_then(ReactorHandle::value)
    }

    /// Try to translate the observer. Returns whether it is translated.
    /// Invalid observers never translate.
    pub fn poll(&mut self) -> bool {
        if !self.valid || self.reactor.is_some() {
            return self.reactor.is_some();
        }
        let Some(context) = self.task.context() else {
            return false;
        };
        let mut mirrored = Vec::with_capacity(self.dependencies.len());
        for dependency in &self.dependencies {
            match context.find_translation(&dependency.task_path) {
                Some(translation) => mirrored.push((dependency.wrapper_path.clone(), translation)),
                None => return false,
            }
        }
        match self.attach(&context, mirrored) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "observer translation failed");
                false
            }
        }
    }

    fn attach(
        &mut self,
        context: &Rc<TranslationContext>,
        mirrored: Vec<(CanvasPath, Translation)>,
    ) -> Result<(), CanvasError> {
        let private = TranslationContext::new(
            self.wrapper.clone(),
            context.environment().clone(),
            context.cancel_token().clone(),
        );
        for (path, translation) in mirrored {
            private.add(
                path,
                Translation {
                    reactor: ReactorHandle::new(MirrorReactor::new(translation.reactor)),
                    ..translation
                },
            );
        }
        let translation = translate(&private, &CanvasPath::root().child(OBSERVER))?;
        let Some(callback) = self.callback.take() else {
            return Ok(());
        };
        let reactor = ReactorHandle::new(CallbackReactor::new(
            translation.reactor,
            translation.result_type,
            callback,
        ));
        self.task.attach(reactor.clone());
        self.reactor = Some(reactor);
        debug!(dependencies = self.dependencies.len(), "observer attached");
        Ok(())
    }
}

impl std::fmt::Debug for CanvasObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasObserver")
            .field("valid", &self.valid)
            .field("dependencies", &self.dependencies)
            .field("translated", &self.reactor.is_some())
            .finish()
    }
}

fn find_dependencies(wrapper: &CanvasNode) -> Vec<Dependency> {
    let root = NodeRef::root(wrapper);
    let (Some(target), Some(observer)) = (root.find_child(TARGET), root.find_child(OBSERVER)) else {
        return Vec::new();
    };
    let target_path = target.path();
    let mut dependencies: Vec<Dependency> = Vec::new();
    for node in observer.depth_first() {
        if referent_string(node.node()).is_none() {
            continue;
        }
        let Some(referent) = find_referent(&node) else {
            continue;
        };
        if !referent.is_within(&target) && !referent.same_node(&target) {
            continue;
        }
        let wrapper_path = referent.path();
        let Some(task_path) = wrapper_path.strip_prefix(&target_path) else {
            continue;
        };
        if dependencies.iter().all(|d| d.wrapper_path != wrapper_path) {
            dependencies.push(Dependency {
                wrapper_path,
                task_path,
            });
        }
    }
    dependencies
}
