//! Canvas core: the node tree, its compiler and its runtime.

pub mod builder;
pub mod canvas_type;
pub mod catalog;
pub mod config_validation;
pub mod error;
pub mod function;
pub mod identity;
pub mod model;
pub mod node;
pub mod node_ref;
pub mod observer;
pub mod order;
pub mod order_channel;
pub mod order_tasks;
pub mod path;
pub mod preprocessor;
pub mod publisher;
pub mod reactor;
pub mod reference;
pub mod task;
pub mod translator;
pub mod validator;
pub mod value;
