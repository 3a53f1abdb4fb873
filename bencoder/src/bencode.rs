use std::collections::BTreeMap;

#[derive(PartialEq, Debug, Clone)]
pub enum Bencode {
    BNumber(i64),
    BString(Vec<u8>),
    BList(Vec<Bencode>),
    BDict(BTreeMap<Vec<u8>, Bencode>),
}

#[derive(PartialEq, Debug)]
pub enum BencodeError {
    UnexpectedEnd,
    InvalidType(u8),
    InvalidNumber,
    InvalidStringLength,
    InvalidDictKey,
    TrailingBytes,
}

pub trait ToBencode {
    fn to_bencode(&self) -> Bencode;
}

impl ToBencode for String {
    fn to_bencode(&self) -> Bencode {
        Bencode::BString(self.as_bytes().to_vec())
    }
}

impl ToBencode for &str {
    fn to_bencode(&self) -> Bencode {
        Bencode::BString(self.as_bytes().to_vec())
    }
}

impl ToBencode for i64 {
    fn to_bencode(&self) -> Bencode {
        Bencode::BNumber(*self)
    }
}

impl ToBencode for u64 {
    fn to_bencode(&self) -> Bencode {
        Bencode::BNumber((*self) as i64)
    }
}

impl ToBencode for u32 {
    fn to_bencode(&self) -> Bencode {
        Bencode::BNumber((*self).into())
    }
}

impl ToBencode for u16 {
    fn to_bencode(&self) -> Bencode {
        Bencode::BNumber((*self).into())
    }
}

impl ToBencode for u8 {
    fn to_bencode(&self) -> Bencode {
        Bencode::BNumber((*self).into())
    }
}

impl ToBencode for Vec<u8> {
    fn to_bencode(&self) -> Bencode {
        Bencode::BString(self.clone())
    }
}

impl ToBencode for BTreeMap<Vec<u8>, Bencode> {
    fn to_bencode(&self) -> Bencode {
        Bencode::BDict(self.clone())
    }
}

impl<T: ToBencode> ToBencode for Vec<T> {
    fn to_bencode(&self) -> Bencode {
        Bencode::BList(self.iter().map(|s| s.to_bencode()).collect())
    }
}

impl ToBencode for Bencode {
    fn to_bencode(&self) -> Bencode {
        self.clone()
    }
}

impl Bencode {
    /// Parses a bencoded byte slice into a Bencode enum.
    ///
    /// Truncated or malformed input returns a `BencodeError`; the decoder
    /// never indexes past the end of the slice. Bytes left over after the
    /// top-level value are rejected.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bencoder::bencode::Bencode;
    ///
    /// let bencode = Bencode::decode(b"5:hello").unwrap();
    /// assert_eq!(bencode, Bencode::BString(b"hello".to_vec()));
    ///
    /// let bencode = Bencode::decode(b"i123e").unwrap();
    /// assert_eq!(bencode, Bencode::BNumber(123));
    /// ```
    pub fn decode(data: &[u8]) -> Result<Bencode, BencodeError> {
        let mut cursor = Cursor::new(data);
        let bencode = cursor.decode_value()?;
        if !cursor.at_end() {
            return Err(BencodeError::TrailingBytes);
        }
        Ok(bencode)
    }

    /// Encodes any `ToBencode` value into its bencoded byte form.
    ///
    /// Dictionary keys come out in lexicographic order because dicts are
    /// backed by a `BTreeMap`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bencoder::bencode::Bencode;
    ///
    /// assert_eq!(Bencode::encode(&String::from("spam")), b"4:spam");
    /// assert_eq!(Bencode::encode(&123i64), b"i123e");
    /// ```
    pub fn encode(value: &dyn ToBencode) -> Vec<u8> {
        let mut out = Vec::new();
        Self::encode_into(&value.to_bencode(), &mut out);
        out
    }

    fn encode_into(bencode: &Bencode, out: &mut Vec<u8>) {
        match bencode {
            Bencode::BNumber(n) => {
                out.push(b'i');
                out.extend(n.to_string().into_bytes());
                out.push(b'e');
            }
            Bencode::BString(s) => {
                out.extend(s.len().to_string().into_bytes());
                out.push(b':');
                out.extend_from_slice(s);
            }
            Bencode::BList(l) => {
                out.push(b'l');
                for item in l {
                    Self::encode_into(item, out);
                }
                out.push(b'e');
            }
            Bencode::BDict(d) => {
                out.push(b'd');
                for (key, value) in d {
                    Self::encode_into(&Bencode::BString(key.clone()), out);
                    Self::encode_into(value, out);
                }
                out.push(b'e');
            }
        }
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek(&self) -> Result<u8, BencodeError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(BencodeError::UnexpectedEnd)
    }

    fn bump(&mut self) -> Result<u8, BencodeError> {
        let byte = self.peek()?;
        self.pos += 1;
        Ok(byte)
    }

    fn decode_value(&mut self) -> Result<Bencode, BencodeError> {
        match self.peek()? {
            b'i' => self.decode_number(),
            b'l' => self.decode_list(),
            b'd' => self.decode_dict(),
            b'0'..=b'9' => self.decode_string(),
            other => Err(BencodeError::InvalidType(other)),
        }
    }

    fn decode_string(&mut self) -> Result<Bencode, BencodeError> {
        let mut length: usize = 0;
        loop {
            match self.bump()? {
                b':' => break,
                digit @ b'0'..=b'9' => {
                    length = length
                        .checked_mul(10)
                        .and_then(|l| l.checked_add((digit - b'0') as usize))
                        .ok_or(BencodeError::InvalidStringLength)?;
                }
                _ => return Err(BencodeError::InvalidStringLength),
            }
        }
        let end = self
            .pos
            .checked_add(length)
            .ok_or(BencodeError::InvalidStringLength)?;
        if end > self.data.len() {
            return Err(BencodeError::UnexpectedEnd);
        }
        let bytes = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(Bencode::BString(bytes))
    }

    fn decode_number(&mut self) -> Result<Bencode, BencodeError> {
        self.bump()?; // consume 'i'
        let start = self.pos;
        while self.peek()? != b'e' {
            self.pos += 1;
        }
        let digits =
            std::str::from_utf8(&self.data[start..self.pos]).map_err(|_| BencodeError::InvalidNumber)?;
        let number = digits.parse::<i64>().map_err(|_| BencodeError::InvalidNumber)?;
        self.pos += 1; // consume 'e'
        Ok(Bencode::BNumber(number))
    }

    fn decode_list(&mut self) -> Result<Bencode, BencodeError> {
        self.bump()?; // consume 'l'
        let mut list = Vec::new();
        while self.peek()? != b'e' {
            list.push(self.decode_value()?);
        }
        self.pos += 1; // consume 'e'
        Ok(Bencode::BList(list))
    }

    fn decode_dict(&mut self) -> Result<Bencode, BencodeError> {
        self.bump()?; // consume 'd'
        let mut dict = BTreeMap::new();
        while self.peek()? != b'e' {
            let key = match self.decode_value()? {
                Bencode::BString(key) => key,
                _ => return Err(BencodeError::InvalidDictKey),
            };
            let value = self.decode_value()?;
            dict.insert(key, value);
        }
        self.pos += 1; // consume 'e'
        Ok(Bencode::BDict(dict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_empty_data() {
        assert_eq!(Bencode::decode(b""), Err(BencodeError::UnexpectedEnd));
    }

    #[test]
    fn test_decode_string() {
        assert_eq!(
            Bencode::decode(b"4:spam").unwrap(),
            Bencode::BString(b"spam".to_vec())
        );
    }

    #[test]
    fn test_decode_empty_string() {
        assert_eq!(
            Bencode::decode(b"0:").unwrap(),
            Bencode::BString(b"".to_vec())
        );
    }

    #[test]
    fn test_decode_truncated_string() {
        assert_eq!(Bencode::decode(b"9:spam"), Err(BencodeError::UnexpectedEnd));
    }

    #[test]
    fn test_decode_positive_integer() {
        assert_eq!(Bencode::decode(b"i3e").unwrap(), Bencode::BNumber(3));
    }

    #[test]
    fn test_decode_negative_integer() {
        assert_eq!(Bencode::decode(b"i-3e").unwrap(), Bencode::BNumber(-3));
    }

    #[test]
    fn test_decode_unterminated_integer() {
        assert_eq!(Bencode::decode(b"i42"), Err(BencodeError::UnexpectedEnd));
    }

    #[test]
    fn test_decode_non_numeric_integer() {
        assert_eq!(Bencode::decode(b"iabce"), Err(BencodeError::InvalidNumber));
    }

    #[test]
    fn test_decode_list() {
        assert_eq!(
            Bencode::decode(b"l4:spam4:eggse").unwrap(),
            Bencode::BList(vec![
                Bencode::BString(b"spam".to_vec()),
                Bencode::BString(b"eggs".to_vec()),
            ])
        );
    }

    #[test]
    fn test_decode_empty_list() {
        assert_eq!(Bencode::decode(b"le").unwrap(), Bencode::BList(vec![]));
    }

    #[test]
    fn test_decode_unterminated_list() {
        assert_eq!(
            Bencode::decode(b"l4:spam"),
            Err(BencodeError::UnexpectedEnd)
        );
    }

    #[test]
    fn test_decode_nested_list() {
        assert_eq!(
            Bencode::decode(b"ll3:fooee").unwrap(),
            Bencode::BList(vec![Bencode::BList(vec![Bencode::BString(
                b"foo".to_vec()
            )])])
        );
    }

    #[test]
    fn test_decode_dict() {
        let mut dict = BTreeMap::new();
        dict.insert(b"cow".to_vec(), Bencode::BString(b"moo".to_vec()));
        dict.insert(b"spam".to_vec(), Bencode::BString(b"eggs".to_vec()));

        assert_eq!(
            Bencode::decode(b"d3:cow3:moo4:spam4:eggse").unwrap(),
            Bencode::BDict(dict)
        );
    }

    #[test]
    fn test_decode_empty_dict() {
        assert_eq!(
            Bencode::decode(b"de").unwrap(),
            Bencode::BDict(BTreeMap::new())
        );
    }

    #[test]
    fn test_decode_dict_with_number_and_string() {
        let mut dict = BTreeMap::new();
        dict.insert(b"bar".to_vec(), Bencode::BString(b"thing".to_vec()));
        dict.insert(b"foo".to_vec(), Bencode::BNumber(42));

        assert_eq!(
            Bencode::decode(b"d3:fooi42e3:bar5:thinge").unwrap(),
            Bencode::BDict(dict)
        );
    }

    #[test]
    fn test_decode_dict_with_non_string_key() {
        assert_eq!(
            Bencode::decode(b"di1e4:spame"),
            Err(BencodeError::InvalidDictKey)
        );
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        assert_eq!(
            Bencode::decode(b"4:spamxx"),
            Err(BencodeError::TrailingBytes)
        );
    }

    #[test]
    fn test_encode_string() {
        assert_eq!(Bencode::encode(&String::from("spam")), b"4:spam");
    }

    #[test]
    fn test_encode_empty_string() {
        assert_eq!(Bencode::encode(&String::from("")), b"0:");
    }

    #[test]
    fn test_encode_positive_integer() {
        assert_eq!(Bencode::encode(&3i64), b"i3e");
    }

    #[test]
    fn test_encode_negative_integer() {
        assert_eq!(Bencode::encode(&-3i64), b"i-3e");
    }

    #[test]
    fn test_encode_vec_of_bytes() {
        assert_eq!(Bencode::encode(&b"spam".to_vec()), b"4:spam");
    }

    #[test]
    fn test_encode_vec_of_strings() {
        let data = vec![String::from("spam"), String::from("eggs")];
        assert_eq!(Bencode::encode(&data), b"l4:spam4:eggse");
    }

    #[test]
    fn test_encode_dict_sorts_keys() {
        let mut dict = BTreeMap::new();
        dict.insert(b"zz".to_vec(), Bencode::BNumber(1));
        dict.insert(b"aa".to_vec(), Bencode::BNumber(2));

        assert_eq!(Bencode::encode(&dict), b"d2:aai2e2:zzi1ee");
    }

    #[test]
    fn test_round_trip_dict() {
        let mut dict = BTreeMap::new();
        dict.insert(b"name".to_vec(), Bencode::BString(b"demo.bin".to_vec()));
        dict.insert(b"length".to_vec(), Bencode::BNumber(1500));
        dict.insert(
            b"files".to_vec(),
            Bencode::BList(vec![Bencode::BNumber(1), Bencode::BString(b"x".to_vec())]),
        );
        let original = Bencode::BDict(dict);

        let encoded = Bencode::encode(&original);
        let decoded = Bencode::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }
}
