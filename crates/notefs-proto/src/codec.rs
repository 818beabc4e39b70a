//! Encode/decode helpers for 9P2000 wire messages.
//!
//! A frame is `size[4] type[1] tag[2] payload`, all integers little endian,
//! strings as `len[2]` followed by UTF-8 bytes.

use std::str;

use crate::types::*;

/// 9P2000 message opcodes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageType {
    Tversion = 100,
    Rversion = 101,
    Tauth = 102,
    Rauth = 103,
    Tattach = 104,
    Rattach = 105,
    Rerror = 107,
    Tflush = 108,
    Rflush = 109,
    Twalk = 110,
    Rwalk = 111,
    Topen = 112,
    Ropen = 113,
    Tcreate = 114,
    Rcreate = 115,
    Tread = 116,
    Rread = 117,
    Twrite = 118,
    Rwrite = 119,
    Tclunk = 120,
    Rclunk = 121,
    Tremove = 122,
    Rremove = 123,
    Tstat = 124,
    Rstat = 125,
    Twstat = 126,
    Rwstat = 127,
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use MessageType::*;
        Ok(match value {
            100 => Tversion,
            101 => Rversion,
            102 => Tauth,
            103 => Rauth,
            104 => Tattach,
            105 => Rattach,
            107 => Rerror,
            108 => Tflush,
            109 => Rflush,
            110 => Twalk,
            111 => Rwalk,
            112 => Topen,
            113 => Ropen,
            114 => Tcreate,
            115 => Rcreate,
            116 => Tread,
            117 => Rread,
            118 => Twrite,
            119 => Rwrite,
            120 => Tclunk,
            121 => Rclunk,
            122 => Tremove,
            123 => Rremove,
            124 => Tstat,
            125 => Rstat,
            126 => Twstat,
            127 => Rwstat,
            other => return Err(CodecError::Unsupported(other)),
        })
    }
}

/// Encode a request into a complete wire frame.
pub fn encode_request(request: &Request) -> Result<Vec<u8>, CodecError> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&request.tag.to_le_bytes());
    let ty = match &request.body {
        RequestBody::Version { msize, version } => {
            payload.extend_from_slice(&msize.to_le_bytes());
            put_string(&mut payload, version)?;
            MessageType::Tversion
        }
        RequestBody::Auth { afid, uname, aname } => {
            payload.extend_from_slice(&afid.to_le_bytes());
            put_string(&mut payload, uname)?;
            put_string(&mut payload, aname)?;
            MessageType::Tauth
        }
        RequestBody::Attach {
            fid,
            afid,
            uname,
            aname,
        } => {
            payload.extend_from_slice(&fid.to_le_bytes());
            payload.extend_from_slice(&afid.to_le_bytes());
            put_string(&mut payload, uname)?;
            put_string(&mut payload, aname)?;
            MessageType::Tattach
        }
        RequestBody::Flush { oldtag } => {
            payload.extend_from_slice(&oldtag.to_le_bytes());
            MessageType::Tflush
        }
        RequestBody::Walk {
            fid,
            newfid,
            wnames,
        } => {
            if wnames.len() > MAXWELEM {
                return Err(CodecError::InvalidPath);
            }
            payload.extend_from_slice(&fid.to_le_bytes());
            payload.extend_from_slice(&newfid.to_le_bytes());
            payload.extend_from_slice(&(wnames.len() as u16).to_le_bytes());
            for name in wnames {
                validate_component(name)?;
                put_string(&mut payload, name)?;
            }
            MessageType::Twalk
        }
        RequestBody::Open { fid, mode } => {
            payload.extend_from_slice(&fid.to_le_bytes());
            payload.push(mode.raw());
            MessageType::Topen
        }
        RequestBody::Create {
            fid,
            name,
            perm,
            mode,
        } => {
            payload.extend_from_slice(&fid.to_le_bytes());
            put_string(&mut payload, name)?;
            payload.extend_from_slice(&perm.to_le_bytes());
            payload.push(mode.raw());
            MessageType::Tcreate
        }
        RequestBody::Read { fid, offset, count } => {
            payload.extend_from_slice(&fid.to_le_bytes());
            payload.extend_from_slice(&offset.to_le_bytes());
            payload.extend_from_slice(&count.to_le_bytes());
            MessageType::Tread
        }
        RequestBody::Write { fid, offset, data } => {
            payload.extend_from_slice(&fid.to_le_bytes());
            payload.extend_from_slice(&offset.to_le_bytes());
            put_data(&mut payload, data)?;
            MessageType::Twrite
        }
        RequestBody::Clunk { fid } => {
            payload.extend_from_slice(&fid.to_le_bytes());
            MessageType::Tclunk
        }
        RequestBody::Remove { fid } => {
            payload.extend_from_slice(&fid.to_le_bytes());
            MessageType::Tremove
        }
        RequestBody::Stat { fid } => {
            payload.extend_from_slice(&fid.to_le_bytes());
            MessageType::Tstat
        }
        RequestBody::Wstat { fid, stat } => {
            payload.extend_from_slice(&fid.to_le_bytes());
            put_wrapped_stat(&mut payload, stat)?;
            MessageType::Twstat
        }
    };
    finish(ty, &payload)
}

/// Encode a response into a complete wire frame.
pub fn encode_response(response: &Response) -> Result<Vec<u8>, CodecError> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&response.tag.to_le_bytes());
    let ty = match &response.body {
        ResponseBody::Version { msize, version } => {
            payload.extend_from_slice(&msize.to_le_bytes());
            put_string(&mut payload, version)?;
            MessageType::Rversion
        }
        ResponseBody::Auth { aqid } => {
            put_qid(&mut payload, aqid);
            MessageType::Rauth
        }
        ResponseBody::Attach { qid } => {
            put_qid(&mut payload, qid);
            MessageType::Rattach
        }
        ResponseBody::Error { ename } => {
            put_string(&mut payload, ename)?;
            MessageType::Rerror
        }
        ResponseBody::Flush => MessageType::Rflush,
        ResponseBody::Walk { qids } => {
            if qids.len() > MAXWELEM {
                return Err(CodecError::InvalidPath);
            }
            payload.extend_from_slice(&(qids.len() as u16).to_le_bytes());
            for qid in qids {
                put_qid(&mut payload, qid);
            }
            MessageType::Rwalk
        }
        ResponseBody::Open { qid, iounit } => {
            put_qid(&mut payload, qid);
            payload.extend_from_slice(&iounit.to_le_bytes());
            MessageType::Ropen
        }
        ResponseBody::Create { qid, iounit } => {
            put_qid(&mut payload, qid);
            payload.extend_from_slice(&iounit.to_le_bytes());
            MessageType::Rcreate
        }
        ResponseBody::Read { data } => {
            put_data(&mut payload, data)?;
            MessageType::Rread
        }
        ResponseBody::Write { count } => {
            payload.extend_from_slice(&count.to_le_bytes());
            MessageType::Rwrite
        }
        ResponseBody::Clunk => MessageType::Rclunk,
        ResponseBody::Remove => MessageType::Rremove,
        ResponseBody::Stat { stat } => {
            put_wrapped_stat(&mut payload, stat)?;
            MessageType::Rstat
        }
        ResponseBody::Wstat => MessageType::Rwstat,
    };
    finish(ty, &payload)
}

/// Decode a request from a complete wire frame.
pub fn decode_request(bytes: &[u8]) -> Result<Request, CodecError> {
    let (ty, payload) = decode_message(bytes)?;
    let mut cursor = Cursor::new(payload);
    let tag = cursor.u16()?;
    let body = match ty {
        MessageType::Tversion => RequestBody::Version {
            msize: cursor.u32()?,
            version: cursor.string()?,
        },
        MessageType::Tauth => RequestBody::Auth {
            afid: cursor.u32()?,
            uname: cursor.string()?,
            aname: cursor.string()?,
        },
        MessageType::Tattach => RequestBody::Attach {
            fid: cursor.u32()?,
            afid: cursor.u32()?,
            uname: cursor.string()?,
            aname: cursor.string()?,
        },
        MessageType::Tflush => RequestBody::Flush {
            oldtag: cursor.u16()?,
        },
        MessageType::Twalk => {
            let fid = cursor.u32()?;
            let newfid = cursor.u32()?;
            let nwname = cursor.u16()? as usize;
            if nwname > MAXWELEM {
                return Err(CodecError::InvalidPath);
            }
            let mut wnames = Vec::with_capacity(nwname);
            for _ in 0..nwname {
                let name = cursor.string()?;
                validate_component(&name)?;
                wnames.push(name);
            }
            RequestBody::Walk {
                fid,
                newfid,
                wnames,
            }
        }
        MessageType::Topen => RequestBody::Open {
            fid: cursor.u32()?,
            mode: OpenMode::from_raw(cursor.u8()?),
        },
        MessageType::Tcreate => RequestBody::Create {
            fid: cursor.u32()?,
            name: cursor.string()?,
            perm: cursor.u32()?,
            mode: OpenMode::from_raw(cursor.u8()?),
        },
        MessageType::Tread => RequestBody::Read {
            fid: cursor.u32()?,
            offset: cursor.u64()?,
            count: cursor.u32()?,
        },
        MessageType::Twrite => RequestBody::Write {
            fid: cursor.u32()?,
            offset: cursor.u64()?,
            data: cursor.data()?,
        },
        MessageType::Tclunk => RequestBody::Clunk { fid: cursor.u32()? },
        MessageType::Tremove => RequestBody::Remove { fid: cursor.u32()? },
        MessageType::Tstat => RequestBody::Stat { fid: cursor.u32()? },
        MessageType::Twstat => {
            let fid = cursor.u32()?;
            let _n = cursor.u16()?;
            RequestBody::Wstat {
                fid,
                stat: read_stat(&mut cursor)?,
            }
        }
        other => return Err(CodecError::Unsupported(other as u8)),
    };
    Ok(Request { tag, body })
}

/// Decode a response from a complete wire frame.
pub fn decode_response(bytes: &[u8]) -> Result<Response, CodecError> {
    let (ty, payload) = decode_message(bytes)?;
    let mut cursor = Cursor::new(payload);
    let tag = cursor.u16()?;
    let body = match ty {
        MessageType::Rversion => ResponseBody::Version {
            msize: cursor.u32()?,
            version: cursor.string()?,
        },
        MessageType::Rauth => ResponseBody::Auth {
            aqid: cursor.qid()?,
        },
        MessageType::Rattach => ResponseBody::Attach { qid: cursor.qid()? },
        MessageType::Rerror => ResponseBody::Error {
            ename: cursor.string()?,
        },
        MessageType::Rflush => ResponseBody::Flush,
        MessageType::Rwalk => {
            let count = cursor.u16()? as usize;
            if count > MAXWELEM {
                return Err(CodecError::InvalidPath);
            }
            let mut qids = Vec::with_capacity(count);
            for _ in 0..count {
                qids.push(cursor.qid()?);
            }
            ResponseBody::Walk { qids }
        }
        MessageType::Ropen => ResponseBody::Open {
            qid: cursor.qid()?,
            iounit: cursor.u32()?,
        },
        MessageType::Rcreate => ResponseBody::Create {
            qid: cursor.qid()?,
            iounit: cursor.u32()?,
        },
        MessageType::Rread => ResponseBody::Read {
            data: cursor.data()?,
        },
        MessageType::Rwrite => ResponseBody::Write {
            count: cursor.u32()?,
        },
        MessageType::Rclunk => ResponseBody::Clunk,
        MessageType::Rremove => ResponseBody::Remove,
        MessageType::Rstat => {
            let _n = cursor.u16()?;
            ResponseBody::Stat {
                stat: read_stat(&mut cursor)?,
            }
        }
        MessageType::Rwstat => ResponseBody::Wstat,
        other => return Err(CodecError::Unsupported(other as u8)),
    };
    Ok(Response { tag, body })
}

/// Tag of a frame whose body may not decode, if the header is present.
pub fn peek_tag(bytes: &[u8]) -> Option<u16> {
    if bytes.len() < HEADER_SIZE {
        return None;
    }
    Some(u16::from_le_bytes([bytes[5], bytes[6]]))
}

/// Encode one stat entry as it appears in a directory read.
pub fn encode_stat(stat: &Stat) -> Result<Vec<u8>, CodecError> {
    let mut body = Vec::new();
    body.extend_from_slice(&stat.typ.to_le_bytes());
    body.extend_from_slice(&stat.dev.to_le_bytes());
    put_qid(&mut body, &stat.qid);
    body.extend_from_slice(&stat.mode.to_le_bytes());
    body.extend_from_slice(&stat.atime.to_le_bytes());
    body.extend_from_slice(&stat.mtime.to_le_bytes());
    body.extend_from_slice(&stat.length.to_le_bytes());
    put_string(&mut body, &stat.name)?;
    put_string(&mut body, &stat.uid)?;
    put_string(&mut body, &stat.gid)?;
    put_string(&mut body, &stat.muid)?;

    let size: u16 = body
        .len()
        .try_into()
        .map_err(|_| CodecError::TooLong(body.len()))?;
    let mut out = Vec::with_capacity(body.len() + 2);
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a sequence of stat entries, as returned by a directory read.
pub fn decode_stats(bytes: &[u8]) -> Result<Vec<Stat>, CodecError> {
    let mut cursor = Cursor::new(bytes);
    let mut stats = Vec::new();
    while !cursor.is_empty() {
        stats.push(read_stat(&mut cursor)?);
    }
    Ok(stats)
}

fn finish(ty: MessageType, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let size = payload.len() + 5;
    let declared: u32 = size.try_into().map_err(|_| CodecError::TooLong(size))?;
    let mut buffer = Vec::with_capacity(size);
    buffer.extend_from_slice(&declared.to_le_bytes());
    buffer.push(ty as u8);
    buffer.extend_from_slice(payload);
    Ok(buffer)
}

fn decode_message(bytes: &[u8]) -> Result<(MessageType, &[u8]), CodecError> {
    if bytes.len() < 5 {
        return Err(CodecError::Truncated);
    }
    let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if declared as usize != bytes.len() {
        return Err(CodecError::LengthMismatch {
            declared,
            actual: bytes.len(),
        });
    }
    let ty = MessageType::try_from(bytes[4])?;
    Ok((ty, &bytes[5..]))
}

fn read_stat(cursor: &mut Cursor<'_>) -> Result<Stat, CodecError> {
    let size = cursor.u16()? as usize;
    let mut inner = Cursor::new(cursor.take(size)?);
    Ok(Stat {
        typ: inner.u16()?,
        dev: inner.u32()?,
        qid: inner.qid()?,
        mode: inner.u32()?,
        atime: inner.u32()?,
        mtime: inner.u32()?,
        length: inner.u64()?,
        name: inner.string()?,
        uid: inner.string()?,
        gid: inner.string()?,
        muid: inner.string()?,
    })
}

fn validate_component(component: &str) -> Result<(), CodecError> {
    if component.is_empty() || component.contains('/') {
        return Err(CodecError::InvalidPath);
    }
    Ok(())
}

fn put_qid(buffer: &mut Vec<u8>, qid: &Qid) {
    buffer.push(qid.ty.raw());
    buffer.extend_from_slice(&qid.version.to_le_bytes());
    buffer.extend_from_slice(&qid.path.to_le_bytes());
}

fn put_string(buffer: &mut Vec<u8>, value: &str) -> Result<(), CodecError> {
    let len: u16 = value
        .len()
        .try_into()
        .map_err(|_| CodecError::TooLong(value.len()))?;
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(value.as_bytes());
    Ok(())
}

fn put_data(buffer: &mut Vec<u8>, data: &[u8]) -> Result<(), CodecError> {
    let count: u32 = data
        .len()
        .try_into()
        .map_err(|_| CodecError::TooLong(data.len()))?;
    buffer.extend_from_slice(&count.to_le_bytes());
    buffer.extend_from_slice(data);
    Ok(())
}

/// `Rstat`/`Twstat` carry the stat behind an extra length prefix.
fn put_wrapped_stat(buffer: &mut Vec<u8>, stat: &Stat) -> Result<(), CodecError> {
    let encoded = encode_stat(stat)?;
    let len: u16 = encoded
        .len()
        .try_into()
        .map_err(|_| CodecError::TooLong(encoded.len()))?;
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(&encoded);
    Ok(())
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(len).ok_or(CodecError::Truncated)?;
        if end > self.buf.len() {
            return Err(CodecError::Truncated);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        let text = str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
        Ok(text.to_owned())
    }

    fn data(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn qid(&mut self) -> Result<Qid, CodecError> {
        let ty = QidType::from_raw(self.u8()?);
        let version = self.u32()?;
        let path = self.u64()?;
        Ok(Qid::new(ty, version, path))
    }
}
