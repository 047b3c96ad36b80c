use serde_json::json;

use super::Commands;
use crate::account::registration::RegistrationRequest;
use crate::config::GatewayConfig;
use crate::login_server::LoginServer;
use crate::session::RequestContext;

/// Run one admin command. `Ok(false)` means the command ran but did not apply
/// (rejected registration, bad credentials, unknown account).
pub fn handle_account_command(
    server: &LoginServer,
    config: &GatewayConfig,
    cmd: Commands,
) -> Result<bool, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Register {
            username,
            password,
            confirm_password,
            email,
            gender,
            security_code,
            issued_code,
            remote_addr,
        } => {
            let request = RegistrationRequest {
                confirm_password: confirm_password.unwrap_or_else(|| password.clone()),
                username,
                password,
                email,
                gender,
                security_code,
            };
            let mut ctx = RequestContext::new(remote_addr);
            if let Some(code) = issued_code {
                ctx = ctx.with_security_code(code);
            }

            match server.register(&request, &ctx) {
                Ok(account) => {
                    println!("Account '{}' created with id {}.", account.username, account.account_id);
                    Ok(true)
                }
                Err(e) => match e.kind() {
                    Some(kind) => {
                        println!("Registration refused ({}): {}", kind.code(), kind);
                        Ok(false)
                    }
                    None => Err(e.into()),
                },
            }
        }
        Commands::Verify { username, password } => {
            let ok = server.is_auth(&username, &password)?;
            println!("{}", if ok { "Credentials valid." } else { "Credentials invalid." });
            Ok(ok)
        }
        Commands::TempBan { account_id, until } => {
            report(account_id, "temporarily banned", server.temporarily_ban(account_id, &until)?)
        }
        Commands::PermBan { account_id } => {
            report(account_id, "permanently banned", server.permanently_ban(account_id)?)
        }
        Commands::Unban { account_id } => report(account_id, "unbanned", server.unban(account_id)?),
        Commands::Show { account_id } => {
            let Some(account) = server.account(account_id)? else {
                println!("Account {} not found.", account_id);
                return Ok(false);
            };
            let record = server
                .store()
                .creation_record(&config.registration.account_create_table, account_id)?;
            let view = json!({
                "account_id": account.account_id,
                "username": account.username,
                "email": account.email,
                "gender": account.gender,
                "level": account.level,
                "state": account.state.0,
                "unban_time": account.unban_time,
                "reg_date": record.as_ref().map(|r| r.reg_date),
                "reg_ip": record.as_ref().map(|r| r.reg_ip.clone()),
            });
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(true)
        }
    }
}

fn report(account_id: u64, action: &str, updated: bool) -> Result<bool, Box<dyn std::error::Error>> {
    if updated {
        println!("Account {} {}.", account_id, action);
    } else {
        println!("Account {} not found.", account_id);
    }
    Ok(updated)
}
