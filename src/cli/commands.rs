use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "stakecoin")]
pub struct Opt {
    #[arg(
        long = "config",
        global = true,
        help = "TOML file with node settings, applied before environment variables"
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createwallet", about = "Create a new wallet")]
    Createwallet,
    #[command(name = "listaddresses", about = "Print local wallet addresses")]
    ListAddresses,
    #[command(
        name = "createblockchain",
        about = "Create a new blockchain, empty when no address is given"
    )]
    Createblockchain {
        #[arg(help = "The address the genesis block pays")]
        address: Option<String>,
    },
    #[command(
        name = "getbalance",
        about = "Get the number of units held by the target address"
    )]
    GetBalance {
        #[arg(help = "The wallet address")]
        address: String,
    },
    #[command(name = "send", about = "Send units between addresses")]
    Send {
        #[arg(help = "Source wallet address")]
        from: String,
        #[arg(help = "Destination wallet address")]
        to: String,
        #[arg(help = "Number of units to send")]
        amount: u64,
        #[arg(
            long = "mine",
            help = "Mine the transaction locally instead of handing it to the bootstrap node"
        )]
        mine: bool,
    },
    #[command(name = "printchain", about = "Print all blocks from tip to genesis")]
    Printchain,
    #[command(name = "startnode", about = "Start a node")]
    StartNode {
        #[arg(long = "miner", help = "Mine headers and send the rewards to ADDRESS")]
        miner: Option<String>,
        #[arg(long = "stake", help = "Address claimed as stakeholder")]
        stake: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send_with_mine_flag() {
        let opt = Opt::parse_from(["stakecoin", "send", "a", "b", "4", "--mine"]);
        match opt.command {
            Command::Send {
                from,
                to,
                amount,
                mine,
            } => {
                assert_eq!((from.as_str(), to.as_str(), amount, mine), ("a", "b", 4, true));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let opt = Opt::parse_from(["stakecoin", "printchain", "--config", "node.toml"]);
        assert_eq!(opt.config, Some(PathBuf::from("node.toml")));
    }
}
