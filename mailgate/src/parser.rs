use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, tag_no_case, take_while1};
use nom::combinator::{cut, eof, map, map_res, opt, recognize, rest, value};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, separated_pair, terminated};
use nom::IResult;

use crate::cmd::Cmd;
use crate::response::{Response, BAD_MAILBOX, MISSING_PARAMETER, SYNTAX_ERROR};
use std::str;

//----- Parser -----------------------------------------------------------------

// Parse a command line from the client. The line has already been stripped
// of its CRLF terminator.
pub(crate) fn parse(line: &[u8]) -> Result<Cmd, Response> {
    command(line).map(|r| r.1).map_err(|e| match e {
        nom::Err::Failure(_) => BAD_MAILBOX,
        nom::Err::Incomplete(_) => MISSING_PARAMETER,
        nom::Err::Error(_) if known_verb(line) => MISSING_PARAMETER,
        nom::Err::Error(_) => SYNTAX_ERROR,
    })
}

fn command(buf: &[u8]) -> IResult<&[u8], Cmd> {
    terminated(
        alt((helo, ehlo, mail, rcpt, data, rset, quit, vrfy, noop, starttls)),
        eof,
    )(buf)
}

// Distinguishes an argument error on a recognized command from an
// unrecognized command.
fn known_verb(line: &[u8]) -> bool {
    const VERBS: [&[u8]; 10] = [
        b"HELO",
        b"EHLO",
        b"MAIL",
        b"RCPT",
        b"DATA",
        b"RSET",
        b"NOOP",
        b"QUIT",
        b"VRFY",
        b"STARTTLS",
    ];
    let verb = line.split(|b| *b == b' ').next().unwrap_or(&[]);
    VERBS.iter().any(|v| verb.eq_ignore_ascii_case(v))
}

fn hello_domain(buf: &[u8]) -> IResult<&[u8], &str> {
    map_res(is_not(" \t\r\n"), str::from_utf8)(buf)
}

fn helo(buf: &[u8]) -> IResult<&[u8], Cmd> {
    let parse_domain = preceded(cmd("helo"), hello_domain);
    map(parse_domain, |domain| Cmd::Helo { domain })(buf)
}

fn ehlo(buf: &[u8]) -> IResult<&[u8], Cmd> {
    let parse_domain = preceded(cmd("ehlo"), hello_domain);
    map(parse_domain, |domain| Cmd::Ehlo { domain })(buf)
}

fn local_part(buf: &[u8]) -> IResult<&[u8], &[u8]> {
    is_not("@ <>\t\r\n")(buf)
}

fn domain_part(buf: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(|b: u8| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'[' || b == b']' || b == b':')(buf)
}

// A bare local@domain mailbox
fn mailbox(buf: &[u8]) -> IResult<&[u8], &str> {
    map_res(
        recognize(separated_pair(local_part, tag("@"), domain_part)),
        str::from_utf8,
    )(buf)
}

// The reverse path of MAIL: <> is the null return path, angle brackets are
// optional around a mailbox.
fn reverse_path(buf: &[u8]) -> IResult<&[u8], &str> {
    alt((
        value("", tag("<>")),
        delimited(tag("<"), mailbox, tag(">")),
        mailbox,
    ))(buf)
}

// The forward path of RCPT. A recipient is always a real mailbox.
fn forward_path(buf: &[u8]) -> IResult<&[u8], &str> {
    alt((delimited(tag("<"), mailbox, tag(">")), mailbox))(buf)
}

// Trailing ESMTP parameters such as SIZE=nnn are tolerated; only
// BODY=8BITMIME changes anything we keep.
fn esmtp_params(buf: &[u8]) -> IResult<&[u8], bool> {
    map(many0(preceded(space, esmtp_param)), |params| {
        params
            .iter()
            .any(|p| p.eq_ignore_ascii_case(b"body=8bitmime"))
    })(buf)
}

fn esmtp_param(buf: &[u8]) -> IResult<&[u8], &[u8]> {
    is_not(" \t\r\n")(buf)
}

fn mail(buf: &[u8]) -> IResult<&[u8], Cmd> {
    let preamble = pair(cmd("mail"), pair(tag_no_case("from:"), opt(space)));
    let parser = preceded(preamble, cut(pair(reverse_path, esmtp_params)));
    map(parser, |(reverse_path, is8bit)| Cmd::Mail {
        reverse_path,
        is8bit,
    })(buf)
}

fn rcpt(buf: &[u8]) -> IResult<&[u8], Cmd> {
    let preamble = pair(cmd("rcpt"), pair(tag_no_case("to:"), opt(space)));
    let parser = preceded(preamble, cut(terminated(forward_path, esmtp_params)));
    map(parser, |path| Cmd::Rcpt { forward_path: path })(buf)
}

fn data(buf: &[u8]) -> IResult<&[u8], Cmd> {
    value(Cmd::Data, tag_no_case("data"))(buf)
}

fn rset(buf: &[u8]) -> IResult<&[u8], Cmd> {
    value(Cmd::Rset, tag_no_case("rset"))(buf)
}

fn quit(buf: &[u8]) -> IResult<&[u8], Cmd> {
    value(Cmd::Quit, tag_no_case("quit"))(buf)
}

fn vrfy(buf: &[u8]) -> IResult<&[u8], Cmd> {
    // The argument is accepted but never verified.
    let with_arg = preceded(cmd("vrfy"), rest);
    alt((
        value(Cmd::Vrfy, with_arg),
        value(Cmd::Vrfy, tag_no_case("vrfy")),
    ))(buf)
}

fn noop(buf: &[u8]) -> IResult<&[u8], Cmd> {
    value(Cmd::Noop, tag_no_case("noop"))(buf)
}

fn starttls(buf: &[u8]) -> IResult<&[u8], Cmd> {
    value(Cmd::StartTls, tag_no_case("starttls"))(buf)
}

//---- Helper functions ---------------------------------------------------------

// Return a parser to match the given command followed by whitespace
fn cmd(cmd_tag: &'static str) -> impl Fn(&[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    move |buf: &[u8]| pair(tag_no_case(cmd_tag), space)(buf)
}

// Match one or more spaces
fn space(buf: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(|b| b == b' ')(buf)
}

//---- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helo_ehlo() {
        assert_eq!(
            parse(b"HELO client.test"),
            Ok(Cmd::Helo {
                domain: "client.test"
            })
        );
        assert_eq!(
            parse(b"ehlo client.test"),
            Ok(Cmd::Ehlo {
                domain: "client.test"
            })
        );
    }

    #[test]
    fn mail_bracketed() {
        assert_eq!(
            parse(b"MAIL FROM:<a@example.org>"),
            Ok(Cmd::Mail {
                reverse_path: "a@example.org",
                is8bit: false,
            })
        );
    }

    #[test]
    fn mail_space_after_colon() {
        assert_eq!(
            parse(b"MAIL FROM: <a@example.org>"),
            Ok(Cmd::Mail {
                reverse_path: "a@example.org",
                is8bit: false,
            })
        );
    }

    #[test]
    fn mail_bare_address() {
        assert_eq!(
            parse(b"MAIL FROM:a@example.org"),
            Ok(Cmd::Mail {
                reverse_path: "a@example.org",
                is8bit: false,
            })
        );
    }

    #[test]
    fn mail_null_return_path() {
        assert_eq!(
            parse(b"MAIL FROM:<>"),
            Ok(Cmd::Mail {
                reverse_path: "",
                is8bit: false,
            })
        );
    }

    #[test]
    fn mail_8bitmime() {
        assert_eq!(
            parse(b"MAIL FROM:<a@example.org> BODY=8BITMIME"),
            Ok(Cmd::Mail {
                reverse_path: "a@example.org",
                is8bit: true,
            })
        );
        assert_eq!(
            parse(b"MAIL FROM:<a@example.org> BODY=7BIT"),
            Ok(Cmd::Mail {
                reverse_path: "a@example.org",
                is8bit: false,
            })
        );
    }

    #[test]
    fn mail_size_parameter_tolerated() {
        assert_eq!(
            parse(b"MAIL FROM:<a@example.org> SIZE=10240"),
            Ok(Cmd::Mail {
                reverse_path: "a@example.org",
                is8bit: false,
            })
        );
    }

    #[test]
    fn mail_bad_mailbox() {
        let res = parse(b"MAIL FROM:<no-at-sign>");
        assert_eq!(res.unwrap_err().code, 553);
    }

    #[test]
    fn mail_missing_key() {
        let res = parse(b"MAIL a@example.org");
        assert_eq!(res.unwrap_err().code, 501);
    }

    #[test]
    fn rcpt_to() {
        assert_eq!(
            parse(b"RCPT TO:<b@example.net>"),
            Ok(Cmd::Rcpt {
                forward_path: "b@example.net"
            })
        );
    }

    #[test]
    fn rcpt_rejects_null_path() {
        let res = parse(b"RCPT TO:<>");
        assert_eq!(res.unwrap_err().code, 553);
    }

    #[test]
    fn bare_commands() {
        assert_eq!(parse(b"DATA"), Ok(Cmd::Data));
        assert_eq!(parse(b"rset"), Ok(Cmd::Rset));
        assert_eq!(parse(b"NOOP"), Ok(Cmd::Noop));
        assert_eq!(parse(b"QUIT"), Ok(Cmd::Quit));
        assert_eq!(parse(b"STARTTLS"), Ok(Cmd::StartTls));
    }

    #[test]
    fn vrfy_with_and_without_argument() {
        assert_eq!(parse(b"VRFY someone"), Ok(Cmd::Vrfy));
        assert_eq!(parse(b"VRFY"), Ok(Cmd::Vrfy));
    }

    #[test]
    fn unknown_command() {
        let res = parse(b"BLARG whatever");
        assert_eq!(res.unwrap_err().code, 500);
    }

    #[test]
    fn helo_without_domain() {
        let res = parse(b"HELO");
        assert_eq!(res.unwrap_err().code, 501);
    }
}
