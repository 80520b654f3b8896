use anyhow::Result;
use vipnode_protocol::PING;

use crate::cli::PingArgs;

pub async fn run(args: PingArgs) -> Result<()> {
	let pong: String = super::call_pool(&args.pool, PING, ()).await?;
	println!("{pong}");
	Ok(())
}
