pub type CmdResult<T> = relink::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

pub mod check;
pub mod config;
pub mod update;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (relink::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Update(args) => dispatch!(args, global, update),
        crate::Commands::Check(args) => dispatch!(args, global, check),
        crate::Commands::Config(args) => dispatch!(args, global, config),
    }
}
