// Entry point for the stakecoin CLI
// Every command loads the layered config first, then works on the data directory it names
use clap::Parser;
use data_encoding::HEXLOWER;
use log::{error, info, LevelFilter};
use stakecoin::{
    address_to_pub_key_hash, convert_address, hash_pub_key, send_tx, validate_address, BlockStore,
    Blockchain, Command, Config, Opt, ProofOfWork, Server, Transaction, UTXOSet, Wallets,
    WALLET_FILE,
};
use std::path::PathBuf;
use std::process;

const BLOCKS_DIR: &str = "blocks";

fn main() {
    // Info by default, RUST_LOG still wins
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn blocks_path(config: &Config) -> PathBuf {
    config.get_data_dir().join(BLOCKS_DIR)
}

fn wallets_path(config: &Config) -> PathBuf {
    config.get_data_dir().join(WALLET_FILE)
}

fn open_blockchain(config: &Config) -> stakecoin::Result<Blockchain> {
    let store = BlockStore::open(blocks_path(config))?;
    Blockchain::open(store, config.get_target_bits()?)
}

fn run_command(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(opt.config.as_deref())?;

    match opt.command {
        Command::Createwallet => {
            let mut wallets = Wallets::open(wallets_path(&config))?;
            let address = wallets.create_wallet()?;
            println!("Your new address: {address}")
        }
        Command::ListAddresses => {
            let wallets = Wallets::open(wallets_path(&config))?;
            for address in wallets.get_addresses() {
                println!("{address}")
            }
        }
        Command::Createblockchain { address } => {
            let store = BlockStore::open(blocks_path(&config))?;
            let target_bits = config.get_target_bits()?;
            let blockchain = match address {
                Some(address) => {
                    if !validate_address(&address) {
                        return Err(format!("Invalid address: {address}").into());
                    }
                    Blockchain::create_with_genesis(store, &address, target_bits)?
                }
                None => Blockchain::create_empty(store, target_bits)?,
            };
            blockchain.get_store().flush()?;
            println!("Done!");
        }
        Command::GetBalance { address } => {
            let pub_key_hash = address_to_pub_key_hash(&address)?;
            let utxo_set = UTXOSet::new(open_blockchain(&config)?);
            let balance = utxo_set.get_balance(&pub_key_hash)?;
            println!("Balance of {address}: {balance}");
        }
        Command::Send {
            from,
            to,
            amount,
            mine,
        } => {
            if !validate_address(&from) {
                return Err(format!("Invalid sender address: {from}").into());
            }
            let wallets = Wallets::open(wallets_path(&config))?;
            let wallet = wallets
                .get_wallet(&from)
                .ok_or_else(|| format!("No local wallet for {from}"))?;

            let blockchain = open_blockchain(&config)?;
            let utxo_set = UTXOSet::new(blockchain.clone());
            let transaction = Transaction::new_utxo_transaction(wallet, &to, amount, &utxo_set)?;

            if mine {
                // I mine right here and claim the stake lottery myself
                let last_index = blockchain.get_last_unit_index()?;
                let coinbase = Transaction::new_coinbase_tx(&from, &from, "", last_index)?;
                let header = blockchain.mine(&from)?;
                let block = blockchain.add_new_block(header, &[coinbase, transaction], &from)?;
                blockchain.get_store().flush()?;
                info!("Mined block {}", HEXLOWER.encode(block.get_hash()));
            } else {
                send_tx(
                    &config.get_node_addr(),
                    &config.get_bootstrap_addr(),
                    &transaction,
                )?;
            }
            println!("Success!")
        }
        Command::Printchain => {
            for block in open_blockchain(&config)?.iterator() {
                let block = block?;
                let header = block.get_header();
                println!("Height: {}", header.get_height());
                println!("Pre block hash: {}", HEXLOWER.encode(header.get_pre_block_hash()));
                println!("Cur block hash: {}", header.get_hash_hex());
                println!("Producer: {}", header.get_producer());
                println!("Timestamp: {}", header.get_timestamp());
                println!("PoW valid: {}", ProofOfWork::validate(header));
                println!("Stake index: {}", block.get_stake_index());

                for tx in block.get_transactions() {
                    println!("- Transaction txid_hex: {}", tx.get_id_hex());
                    if !tx.is_coinbase() {
                        for input in tx.get_vin() {
                            let pub_key_hash = hash_pub_key(input.get_pub_key());
                            println!(
                                "-- Input txid = {}, vout = {}, from = {}",
                                input.get_txid_hex(),
                                input.get_vout(),
                                convert_address(pub_key_hash.as_slice()),
                            )
                        }
                    }
                    for output in tx.get_vout() {
                        let units = output.get_units();
                        println!(
                            "-- Output units = {} [{}..={}], to = {}",
                            output.get_value(),
                            units.min_index().unwrap_or_default(),
                            units.max_index().unwrap_or_default(),
                            convert_address(output.get_pub_key_hash()),
                        )
                    }
                }
                println!()
            }
        }
        Command::StartNode { miner, stake } => {
            if let Some(addr) = miner {
                if !validate_address(&addr) {
                    return Err(format!("Invalid miner address: {addr}").into());
                }
                config.set_mining_addr(&addr);
            }
            if let Some(addr) = stake {
                if !validate_address(&addr) {
                    return Err(format!("Invalid stake address: {addr}").into());
                }
                config.set_stake_addr(&addr);
            }
            info!("Starting node {}", config.get_node_addr());
            let blockchain = open_blockchain(&config)?;
            let server = Server::new(blockchain, &config)?;
            server.run()?;
        }
    }
    Ok(())
}
