//! Lua modifier scripts.
//!
//! Each call builds a new interpreter, binds the helper set and the context
//! as globals, runs the script and reads the globals back. The interpreter
//! is dropped on every exit path, so nothing leaks between calls.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;
use mlua::{Lua, Table, Value, Variadic};
use regex::Regex;
use tracing::{debug, info, warn};

use super::{Transform, TransformContext, TransformError};
use crate::fairy::to_filename;
use crate::rules::TextEncoding;
use crate::rules::encoding::encode_shift_jis;
use crate::wave;

/// [`Transform`] backed by an embedded Lua 5.4 interpreter.
#[derive(Clone, Copy, Debug, Default)]
pub struct LuaTransform;

impl LuaTransform {
    pub fn new() -> Self {
        Self
    }
}

impl Transform for LuaTransform {
    fn apply(
        &self,
        script: &str,
        ctx: TransformContext,
    ) -> Result<TransformContext, TransformError> {
        let lua = Lua::new();
        install_helpers(&lua, ctx.wave())?;

        let globals = lua.globals();
        globals.set("layer", ctx.layer)?;
        globals.set("text", ctx.text.as_str())?;
        globals.set("filename", ctx.filename.as_str())?;
        globals.set("wave", ctx.wave().to_string_lossy().into_owned())?;
        globals.set("padding", ctx.padding)?;
        globals.set("userdata", ctx.user_data.as_str())?;
        globals.set("exofile", ctx.exo_file.as_str())?;
        globals.set("luafile", ctx.lua_file.as_str())?;

        lua.load(script).set_name("modifier").exec()?;

        let mut out = ctx;
        out.layer = read_integer(&globals, "layer")?;
        out.text = read_string(&globals, "text")?;
        out.filename = read_string(&globals, "filename")?;
        out.padding = read_integer(&globals, "padding")?;
        out.user_data = read_string(&globals, "userdata")?;
        out.exo_file = read_string(&globals, "exofile")?;
        out.lua_file = read_string(&globals, "luafile")?;

        if Path::new(&out.filename).file_name() != Some(OsStr::new(&out.filename)) {
            return Err(TransformError::InvalidField {
                field: "filename",
                reason: format!("{:?} is not a plain file name", out.filename),
            });
        }
        Ok(out)
    }
}

fn read_integer(globals: &Table, field: &'static str) -> Result<i64, TransformError> {
    match globals.get::<Value>(field)? {
        Value::Integer(i) => Ok(i),
        Value::Number(n) if n.is_finite() => Ok(n.trunc() as i64),
        other => Err(TransformError::InvalidField {
            field,
            reason: format!("expected a number, got {}", other.type_name()),
        }),
    }
}

fn read_string(globals: &Table, field: &'static str) -> Result<String, TransformError> {
    match globals.get::<Value>(field)? {
        Value::String(s) => Ok(s.to_string_lossy().to_string()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(TransformError::InvalidField {
            field,
            reason: format!("expected a string, got {}", other.type_name()),
        }),
    }
}

fn install_helpers(lua: &Lua, wave_path: &Path) -> mlua::Result<()> {
    let globals = lua.globals();

    globals.set(
        "debug_print",
        lua.create_function(|_, msg: String| {
            info!(target: "voxdrop::script", "{msg}");
            Ok(())
        })?,
    )?;
    globals.set(
        "debug_print_verbose",
        lua.create_function(|_, msg: String| {
            debug!(target: "voxdrop::script", "{msg}");
            Ok(())
        })?,
    )?;

    globals.set(
        "getaudioinfo",
        lua.create_function(|lua, path: String| {
            let info = wave::inspect(Path::new(&path)).map_err(mlua::Error::runtime)?;
            let table = lua.create_table()?;
            table.set("samplerate", info.sample_rate)?;
            table.set("channels", info.channels)?;
            table.set("bits", info.bits_per_sample)?;
            table.set("samples", info.frames)?;
            Ok(table)
        })?,
    )?;

    globals.set(
        "tofilename",
        lua.create_function(|_, (text, max): (String, Option<i64>)| {
            let max = max.map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(0));
            Ok(to_filename(&text, max))
        })?,
    )?;

    globals.set(
        "tosjis",
        lua.create_function(|lua, text: String| {
            let bytes = encode_shift_jis(&text).map_err(mlua::Error::runtime)?;
            lua.create_string(bytes)
        })?,
    )?;
    globals.set(
        "fromsjis",
        lua.create_function(|_, raw: mlua::String| {
            TextEncoding::ShiftJis
                .decode(&raw.as_bytes())
                .map_err(mlua::Error::runtime)
        })?,
    )?;

    let wave_path = wave_path.to_path_buf();
    globals.set(
        "execute",
        lua.create_function(move |_, args: Variadic<String>| {
            run_external(&wave_path, &args).map_err(mlua::Error::runtime)
        })?,
    )?;

    globals.set("re", regex_table(lua)?)?;
    Ok(())
}

/// Run an external command. `%BEFORE%` is the wave path and `%AFTER%` a
/// scratch path; when the command writes `%AFTER%` it replaces the wave.
fn run_external(wave_path: &Path, args: &[String]) -> Result<(), String> {
    let Some((program, rest)) = args.split_first() else {
        return Ok(());
    };
    let scratch = scratch_path();
    let before = wave_path.to_string_lossy();
    let after = scratch.to_string_lossy();
    let substitute = |arg: &String| arg.replace("%BEFORE%", &before).replace("%AFTER%", &after);

    let program = substitute(program);
    let status = Command::new(&program)
        .args(rest.iter().map(substitute))
        .status()
        .map_err(|e| format!("failed to run {program}: {e}"));

    let result = match status {
        Ok(status) if status.success() => {
            if scratch.exists() {
                std::fs::copy(&scratch, wave_path)
                    .map(|_| ())
                    .map_err(|e| format!("failed to replace {}: {e}", wave_path.display()))
            } else {
                Ok(())
            }
        }
        Ok(status) => Err(format!("{program} exited with {status}")),
        Err(e) => Err(e),
    };

    if scratch.exists()
        && let Err(err) = std::fs::remove_file(&scratch)
    {
        warn!(path = %scratch.display(), error = %err, "failed to remove scratch file");
    }
    result
}

fn scratch_path() -> PathBuf {
    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    std::env::temp_dir().join(format!("voxdrop{}_{stamp}.wav", std::process::id()))
}

fn compile(pattern: &str) -> mlua::Result<Regex> {
    Regex::new(pattern).map_err(mlua::Error::runtime)
}

/// `re.match`, `re.find`, `re.gsub` and `re.quote`, following the calling
/// conventions of Lua's string library with `regex` crate syntax.
fn regex_table(lua: &Lua) -> mlua::Result<Table> {
    let re = lua.create_table()?;

    re.set(
        "match",
        lua.create_function(|_, (subject, pattern): (String, String)| {
            let regex = compile(&pattern)?;
            let Some(caps) = regex.captures(&subject) else {
                return Ok(Variadic::new());
            };
            if caps.len() == 1 {
                return Ok(Variadic::from_iter([Some(caps[0].to_string())]));
            }
            Ok(caps
                .iter()
                .skip(1)
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect())
        })?,
    )?;

    re.set(
        "find",
        lua.create_function(|_, (subject, pattern): (String, String)| {
            let regex = compile(&pattern)?;
            Ok(regex
                .find(&subject)
                .map(|m| Variadic::from_iter([m.start() + 1, m.end()]))
                .unwrap_or_else(Variadic::new))
        })?,
    )?;

    re.set(
        "gsub",
        lua.create_function(
            |_, (subject, pattern, replacement): (String, String, String)| {
                let regex = compile(&pattern)?;
                let count = regex.find_iter(&subject).count();
                let replaced = regex.replace_all(&subject, replacement.as_str());
                Ok((replaced.into_owned(), count))
            },
        )?,
    )?;

    re.set(
        "quote",
        lua.create_function(|_, text: String| Ok(regex::escape(&text)))?,
    )?;

    Ok(re)
}
