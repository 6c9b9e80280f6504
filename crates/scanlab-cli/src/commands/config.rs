//! `scanlab config`: print the effective configuration.

use scanlab_config::ScanlabConfig;

use crate::error::CliResult;
use crate::output::render_json;

pub(crate) fn handle_config(config: &ScanlabConfig) -> CliResult<()> {
    render_json(config)
}
